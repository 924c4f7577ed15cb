//! The write path of the counting game: validate an attempt, evaluate it against the
//! committed state and commit the outcome with optimistic concurrency.

use std::time::Duration;

use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    dao::{
        game_store::GameStore,
        models::{Commit, CommitStatus},
    },
    error::ServiceError,
    state::{
        SharedState,
        counting::{CountAttempt, HistoryEntry, evaluate},
    },
};

/// Submit an attempt under the configured deadline.
///
/// Returns the history entry recorded for the attempt; its `outcome` tells the caller how
/// to respond. Rejections are successful submissions, only store trouble is an error.
pub async fn submit(state: &SharedState, attempt: CountAttempt) -> Result<HistoryEntry, ServiceError> {
    submit_within(state, attempt, None).await
}

/// Submit an attempt under an explicit deadline (`None` uses the configured one).
pub async fn submit_within(
    state: &SharedState,
    attempt: CountAttempt,
    limit: Option<Duration>,
) -> Result<HistoryEntry, ServiceError> {
    attempt.validate()?;
    let store = state.require_game_store().await?;
    let max_attempts = state.config().engine.commit_attempts();

    let entry = state
        .run_with_deadline(limit, commit_with_retry(store.as_ref(), attempt, max_attempts))
        .await
        .inspect_err(|err| warn!(error = %err, "count attempt was not committed"))?;

    info!(
        sequence_id = entry.sequence_id,
        outcome = entry.outcome.as_str(),
        number = ?entry.attempt.parsed_number,
        sender = %entry.attempt.sender_id,
        current = entry.resulting_state.last_valid_number,
        "count attempt committed"
    );
    state.publish(entry.clone());
    Ok(entry)
}

/// Read, evaluate and compare-and-swap until a commit lands or `max_attempts` is reached.
async fn commit_with_retry(
    store: &dyn GameStore,
    attempt: CountAttempt,
    max_attempts: u32,
) -> Result<HistoryEntry, ServiceError> {
    for round in 1..=max_attempts {
        let already_processed = match &attempt.idempotency_key {
            Some(key) => store.contains_key(key.clone()).await?,
            None => false,
        };
        let head = store.load_head().await?;
        let transition = evaluate(&head.state, &attempt, already_processed);

        match store
            .commit(Commit::new(head, attempt.clone(), transition))
            .await?
        {
            CommitStatus::Committed(entry) => return Ok(entry),
            CommitStatus::Conflict => {
                debug!(round, "commit lost to a concurrent writer; re-validating");
            }
        }
    }

    Err(ServiceError::StoreBusy {
        attempts: max_attempts,
    })
}
