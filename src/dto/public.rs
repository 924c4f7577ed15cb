use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    dto::validation::MAX_PAGE_SIZE,
    state::counting::{GameState, HistoryEntry, LeaderboardEntry, Outcome},
};

/// Response of the public current-number endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentNumberResponse {
    pub number: i64,
}

/// Page size accepted by the list endpoints.
#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LimitQuery {
    /// Maximum number of entries to return.
    #[validate(range(max = MAX_PAGE_SIZE))]
    pub limit: Option<usize>,
}

impl LimitQuery {
    pub fn limit_or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardEntryDto {
    pub user_id: String,
    pub valid_count: u64,
}

impl From<LeaderboardEntry> for LeaderboardEntryDto {
    fn from(entry: LeaderboardEntry) -> Self {
        Self {
            user_id: entry.user_id,
            valid_count: entry.valid_count,
        }
    }
}

/// Users ranked by accepted counts, best first.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    pub entries: Vec<LeaderboardEntryDto>,
}

/// Committed game state with RFC 3339 timestamps.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameStateDto {
    pub last_valid_number: i64,
    pub last_sender_id: Option<String>,
    pub last_count_at: Option<String>,
    pub version: u64,
}

impl From<GameState> for GameStateDto {
    fn from(state: GameState) -> Self {
        Self {
            last_valid_number: state.last_valid_number,
            last_sender_id: state.last_sender_id,
            last_count_at: state.last_count_at.map(format_system_time),
            version: state.version,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryEntryDto {
    pub sequence_id: u64,
    pub sender_id: String,
    pub channel_id: String,
    /// Absent when the message could not be parsed as a number.
    pub parsed_number: Option<i64>,
    pub posted_at: String,
    pub outcome: Outcome,
    pub resulting_state: GameStateDto,
}

impl From<HistoryEntry> for HistoryEntryDto {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            sequence_id: entry.sequence_id,
            sender_id: entry.attempt.sender_id,
            channel_id: entry.attempt.channel_id,
            parsed_number: entry.attempt.parsed_number,
            posted_at: format_system_time(entry.attempt.timestamp),
            outcome: entry.outcome,
            resulting_state: entry.resulting_state.into(),
        }
    }
}

/// Most recent attempts first.
#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryResponse {
    pub entries: Vec<HistoryEntryDto>,
}

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn state_timestamps_render_as_rfc3339() {
        let dto = GameStateDto::from(GameState {
            last_valid_number: 4,
            last_sender_id: Some("U1".into()),
            last_count_at: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
            version: 7,
        });

        assert_eq!(dto.last_count_at.as_deref(), Some("2023-11-14T22:13:20Z"));
        assert_eq!(GameStateDto::from(GameState::default()).last_count_at, None);
    }

    #[test]
    fn limit_query_rejects_oversized_pages() {
        assert!(LimitQuery { limit: Some(100) }.validate().is_ok());
        assert!(LimitQuery { limit: Some(101) }.validate().is_err());
        assert_eq!(LimitQuery { limit: None }.limit_or(10), 10);
    }
}
