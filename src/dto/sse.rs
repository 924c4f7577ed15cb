use serde::Serialize;
use utoipa::ToSchema;

use crate::state::counting::{HistoryEntry, Outcome};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast for every committed attempt.
pub struct AttemptEvent {
    pub sequence_id: u64,
    pub sender_id: String,
    pub number: Option<i64>,
    pub outcome: Outcome,
    /// Number the sequence stands at after this attempt.
    pub current_number: i64,
}

impl From<&HistoryEntry> for AttemptEvent {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            sequence_id: entry.sequence_id,
            sender_id: entry.attempt.sender_id.clone(),
            number: entry.attempt.parsed_number,
            outcome: entry.outcome,
            current_number: entry.resulting_state.last_valid_number,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// First message sent to a new SSE subscriber.
pub struct Handshake {
    pub current_number: Option<i64>,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}
