//! Slack Events API and slash-command payloads.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::counting::Outcome;

/// Outer envelope of a Slack Events API delivery.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEnvelope {
    /// Handshake sent when the events URL is configured.
    UrlVerification {
        token: Option<String>,
        challenge: String,
    },
    /// A subscribed workspace event.
    EventCallback {
        token: Option<String>,
        event_id: Option<String>,
        event: SlackInnerEvent,
    },
    /// Any envelope type we do not handle (rate limiting notices, app revocations...).
    #[serde(other)]
    Unknown,
}

/// Inner event of an `event_callback`; only `message` events are counted.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackInnerEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Message timestamp; unique per channel, so it doubles as the message id.
    #[serde(default)]
    pub ts: Option<String>,
}

/// Acknowledgement returned for an event delivery.
#[derive(Debug, Serialize, ToSchema)]
pub struct EventAck {
    /// Outcome of the count attempt, absent when the event was not a count.
    pub outcome: Option<Outcome>,
    pub sequence_id: Option<u64>,
}

impl EventAck {
    pub fn ignored() -> Self {
        Self {
            outcome: None,
            sequence_id: None,
        }
    }
}

/// Form body Slack posts for a slash command.
#[derive(Debug, Deserialize)]
pub struct SlashCommandForm {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Message returned synchronously to a slash command.
#[derive(Debug, Serialize, ToSchema)]
pub struct SlashCommandResponse {
    /// `ephemeral` (only the caller sees it) or `in_channel`.
    pub response_type: String,
    pub text: String,
}

impl SlashCommandResponse {
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            response_type: "ephemeral".to_string(),
            text: text.into(),
        }
    }
}
