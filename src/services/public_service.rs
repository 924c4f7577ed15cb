//! Read-only projections of the committed counting state.

use crate::{
    error::ServiceError,
    state::{
        SharedState,
        counting::{GameState, HistoryEntry, LeaderboardEntry},
    },
};

/// Return the last number that correctly extended the sequence.
pub async fn current_number(state: &SharedState) -> Result<i64, ServiceError> {
    Ok(snapshot(state).await?.last_valid_number)
}

/// Return the full committed game state.
pub async fn snapshot(state: &SharedState) -> Result<GameState, ServiceError> {
    let store = state.require_game_store().await?;
    state
        .run_with_deadline(None, async move { Ok(store.load_head().await?.state) })
        .await
}

/// Return at most `limit` leaderboard entries, best first.
pub async fn top(state: &SharedState, limit: usize) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    let store = state.require_game_store().await?;
    state
        .run_with_deadline(None, async move { Ok(store.top(limit).await?) })
        .await
}

/// Return at most `limit` history entries, most recent first.
pub async fn recent(state: &SharedState, limit: usize) -> Result<Vec<HistoryEntry>, ServiceError> {
    let store = state.require_game_store().await?;
    state
        .run_with_deadline(None, async move { Ok(store.recent(limit).await?) })
        .await
}
