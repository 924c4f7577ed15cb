use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use super::error::{MongoDaoError, MongoResult};
use crate::{
    dao::models::{Commit, LedgerHead},
    state::counting::{CountAttempt, GameState, HistoryEntry, LeaderboardEntry, Outcome},
};

pub const STATE_DOCUMENT_ID: &str = "singleton";

/// Singleton document storing the game state and the history guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoStateDocument {
    #[serde(rename = "_id")]
    id: String,
    last_valid_number: i64,
    last_sender_id: Option<String>,
    last_count_at: Option<DateTime>,
    version: i64,
    last_sequence_id: i64,
}

/// Game state as embedded in history documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoStateFields {
    last_valid_number: i64,
    last_sender_id: Option<String>,
    last_count_at: Option<DateTime>,
    version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoHistoryDocument {
    #[serde(rename = "_id")]
    sequence_id: i64,
    sender_id: String,
    channel_id: String,
    parsed_number: Option<i64>,
    timestamp: DateTime,
    idempotency_key: Option<String>,
    outcome: Outcome,
    resulting_state: MongoStateFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoLeaderboardDocument {
    #[serde(rename = "_id")]
    user_id: String,
    valid_count: i64,
}

/// Marker recording that an idempotency key was processed by `sequence_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoKeyDocument {
    #[serde(rename = "_id")]
    key: String,
    sequence_id: i64,
}

impl MongoKeyDocument {
    pub fn new(key: &str, sequence_id: u64) -> Self {
        Self {
            key: key.to_owned(),
            sequence_id: signed(sequence_id),
        }
    }
}

impl From<&GameState> for MongoStateFields {
    fn from(value: &GameState) -> Self {
        Self {
            last_valid_number: value.last_valid_number,
            last_sender_id: value.last_sender_id.clone(),
            last_count_at: value.last_count_at.map(DateTime::from_system_time),
            version: signed(value.version),
        }
    }
}

impl TryFrom<MongoStateFields> for GameState {
    type Error = MongoDaoError;

    fn try_from(value: MongoStateFields) -> MongoResult<Self> {
        Ok(Self {
            last_valid_number: value.last_valid_number,
            last_sender_id: value.last_sender_id,
            last_count_at: value.last_count_at.map(DateTime::to_system_time),
            version: unsigned("game_state", "version", value.version)?,
        })
    }
}

impl MongoStateDocument {
    /// Fields written by the initialize-if-absent upsert.
    pub fn defaults() -> Document {
        doc! {
            "last_valid_number": 0_i64,
            "last_sender_id": null,
            "last_count_at": null,
            "version": 0_i64,
            "last_sequence_id": 0_i64,
        }
    }

    /// Filter matching the state document only while it still equals `head`.
    pub fn guard(head: &LedgerHead) -> Document {
        doc! {
            "_id": STATE_DOCUMENT_ID,
            "version": signed(head.state.version),
            "last_sequence_id": signed(head.last_sequence_id),
        }
    }

    /// `$set` update installing the head left behind by `commit`.
    pub fn advance(commit: &Commit) -> Document {
        let next = commit.next_head();
        doc! {
            "$set": {
                "last_valid_number": next.state.last_valid_number,
                "last_sender_id": next.state.last_sender_id,
                "last_count_at": next.state.last_count_at.map(DateTime::from_system_time),
                "version": signed(next.state.version),
                "last_sequence_id": signed(next.last_sequence_id),
            }
        }
    }
}

impl TryFrom<MongoStateDocument> for LedgerHead {
    type Error = MongoDaoError;

    fn try_from(value: MongoStateDocument) -> MongoResult<Self> {
        let fields = MongoStateFields {
            last_valid_number: value.last_valid_number,
            last_sender_id: value.last_sender_id,
            last_count_at: value.last_count_at,
            version: value.version,
        };
        Ok(Self {
            state: fields.try_into()?,
            last_sequence_id: unsigned("game_state", "last_sequence_id", value.last_sequence_id)?,
        })
    }
}

impl From<&HistoryEntry> for MongoHistoryDocument {
    fn from(entry: &HistoryEntry) -> Self {
        let CountAttempt {
            sender_id,
            channel_id,
            parsed_number,
            timestamp,
            idempotency_key,
        } = entry.attempt.clone();

        Self {
            sequence_id: signed(entry.sequence_id),
            sender_id,
            channel_id,
            parsed_number,
            timestamp: DateTime::from_system_time(timestamp),
            idempotency_key,
            outcome: entry.outcome,
            resulting_state: (&entry.resulting_state).into(),
        }
    }
}

impl TryFrom<MongoHistoryDocument> for HistoryEntry {
    type Error = MongoDaoError;

    fn try_from(value: MongoHistoryDocument) -> MongoResult<Self> {
        Ok(Self {
            sequence_id: unsigned("history", "_id", value.sequence_id)?,
            attempt: CountAttempt {
                sender_id: value.sender_id,
                channel_id: value.channel_id,
                parsed_number: value.parsed_number,
                timestamp: value.timestamp.to_system_time(),
                idempotency_key: value.idempotency_key,
            },
            outcome: value.outcome,
            resulting_state: value.resulting_state.try_into()?,
        })
    }
}

impl TryFrom<MongoLeaderboardDocument> for LeaderboardEntry {
    type Error = MongoDaoError;

    fn try_from(value: MongoLeaderboardDocument) -> MongoResult<Self> {
        Ok(Self {
            valid_count: unsigned("leaderboard", "valid_count", value.valid_count)?,
            user_id: value.user_id,
        })
    }
}

/// BSON has no unsigned 64-bit integer; counters are stored as `i64`.
fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn unsigned(collection: &'static str, field: &str, value: i64) -> MongoResult<u64> {
    u64::try_from(value).map_err(|_| MongoDaoError::Decode {
        collection,
        message: format!("`{field}` is negative ({value})"),
    })
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use mongodb::bson;

    use super::*;
    use crate::state::counting::{Transition, evaluate};

    fn accepted_commit() -> Commit {
        let attempt = CountAttempt {
            sender_id: "U1".into(),
            channel_id: "C1".into(),
            parsed_number: Some(1),
            timestamp: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            idempotency_key: Some("C1:1.0".into()),
        };
        let head = LedgerHead::default();
        let transition: Transition = evaluate(&head.state, &attempt, false);
        Commit::new(head, attempt, transition)
    }

    #[test]
    fn guard_and_advance_target_the_expected_head() {
        let commit = accepted_commit();

        assert_eq!(
            MongoStateDocument::guard(&commit.expected),
            doc! {"_id": STATE_DOCUMENT_ID, "version": 0_i64, "last_sequence_id": 0_i64}
        );

        let update = MongoStateDocument::advance(&commit);
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_i64("last_valid_number").unwrap(), 1);
        assert_eq!(set.get_str("last_sender_id").unwrap(), "U1");
        assert_eq!(set.get_i64("version").unwrap(), 1);
        assert_eq!(set.get_i64("last_sequence_id").unwrap(), 1);
    }

    #[test]
    fn history_document_maps_back_to_entry() {
        let entry = accepted_commit().history_entry();
        let document = bson::serialize_to_document(&MongoHistoryDocument::from(&entry)).unwrap();

        assert_eq!(document.get_i64("_id").unwrap(), 1);
        assert_eq!(document.get_str("outcome").unwrap(), "accepted");

        let decoded: MongoHistoryDocument = bson::deserialize_from_document(document).unwrap();
        assert_eq!(HistoryEntry::try_from(decoded).unwrap(), entry);
    }

    #[test]
    fn negative_counters_are_reported_as_corruption() {
        let document = MongoLeaderboardDocument {
            user_id: "U1".into(),
            valid_count: -3,
        };

        assert!(matches!(
            LeaderboardEntry::try_from(document),
            Err(MongoDaoError::Decode { collection: "leaderboard", .. })
        ));
    }
}
