use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Singleton state of the counting game. The default is the fresh, never-counted state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameState {
    /// Last number that correctly extended the sequence (0 after a reset).
    pub last_valid_number: i64,
    /// User who posted `last_valid_number`, cleared on reset.
    pub last_sender_id: Option<String>,
    /// Timestamp of the last accepted attempt.
    pub last_count_at: Option<SystemTime>,
    /// Incremented on every state-changing commit.
    pub version: u64,
}

/// A normalized count attempt handed to the engine by the chat adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CountAttempt {
    /// Identifier of the user who posted the attempt.
    #[validate(length(min = 1, max = 128))]
    pub sender_id: String,
    /// Channel the attempt was posted in.
    #[validate(length(min = 1, max = 128))]
    pub channel_id: String,
    /// Parsed integer, or `None` when the message looked numeric but failed to parse.
    pub parsed_number: Option<i64>,
    /// Time the attempt was posted.
    pub timestamp: SystemTime,
    /// Platform message identifier used to drop redelivered events.
    #[validate(length(min = 1, max = 256))]
    pub idempotency_key: Option<String>,
}

/// Classification of a processed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The attempt extended the sequence.
    Accepted,
    /// The number was not the next one; the sequence was reset.
    RejectedWrongNumber,
    /// The right number, posted by the user who posted the previous one.
    RejectedConsecutiveSender,
    /// The idempotency key was already processed.
    RejectedDuplicate,
    /// The upstream parser could not extract a number.
    RejectedUnparsable,
}

impl Outcome {
    /// Stable snake_case label used in logs and rendered responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Accepted => "accepted",
            Outcome::RejectedWrongNumber => "rejected_wrong_number",
            Outcome::RejectedConsecutiveSender => "rejected_consecutive_sender",
            Outcome::RejectedDuplicate => "rejected_duplicate",
            Outcome::RejectedUnparsable => "rejected_unparsable",
        }
    }

    pub fn is_accepted(self) -> bool {
        matches!(self, Outcome::Accepted)
    }
}

/// Append-only audit record written for every submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Strictly increasing, assigned by the store at commit time.
    pub sequence_id: u64,
    pub attempt: CountAttempt,
    pub outcome: Outcome,
    /// State after this entry (unchanged state for non-resetting rejections).
    pub resulting_state: GameState,
}

/// Per-user tally of accepted attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub valid_count: u64,
}

/// Result of evaluating one attempt against a state, before it is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub outcome: Outcome,
    pub next: GameState,
    /// User whose leaderboard entry is credited by this transition.
    pub credit: Option<String>,
}

/// Apply the counting rules to `attempt` observed against `current`.
///
/// `already_processed` reports whether the attempt's idempotency key is already recorded.
/// The returned state only differs from `current` for accepted attempts and resets, and in
/// both cases carries a bumped `version`.
pub fn evaluate(current: &GameState, attempt: &CountAttempt, already_processed: bool) -> Transition {
    let unchanged = |outcome| Transition {
        outcome,
        next: current.clone(),
        credit: None,
    };

    if already_processed {
        return unchanged(Outcome::RejectedDuplicate);
    }

    let Some(number) = attempt.parsed_number else {
        return unchanged(Outcome::RejectedUnparsable);
    };

    if current.last_valid_number.checked_add(1) != Some(number) {
        return Transition {
            outcome: Outcome::RejectedWrongNumber,
            next: GameState {
                last_valid_number: 0,
                last_sender_id: None,
                last_count_at: current.last_count_at,
                version: current.version + 1,
            },
            credit: None,
        };
    }

    if current.last_sender_id.as_deref() == Some(attempt.sender_id.as_str()) {
        return unchanged(Outcome::RejectedConsecutiveSender);
    }

    Transition {
        outcome: Outcome::Accepted,
        next: GameState {
            last_valid_number: number,
            last_sender_id: Some(attempt.sender_id.clone()),
            last_count_at: Some(attempt.timestamp),
            version: current.version + 1,
        },
        credit: Some(attempt.sender_id.clone()),
    }
}
