//! Slack adapter: turns Events API deliveries into count attempts and renders the
//! leaderboard and history slash commands.

use std::{
    fmt::Write as _,
    time::{Duration, SystemTime},
};

use tracing::{debug, warn};

use crate::{
    config::SlackConfig,
    dto::{
        slack::{EventAck, SlackEnvelope, SlackInnerEvent, SlashCommandForm, SlashCommandResponse},
        validation::validate_limit_text,
    },
    error::ServiceError,
    services::{counting_service, public_service},
    state::{
        SharedState,
        counting::{CountAttempt, HistoryEntry, LeaderboardEntry, Outcome},
    },
};

const DEFAULT_LEADERBOARD_SIZE: usize = 10;
const DEFAULT_EVENTS_SIZE: usize = 10;

/// What the events endpoint should answer.
#[derive(Debug)]
pub enum EventReply {
    /// Echo the URL verification challenge as plain text.
    Challenge(String),
    /// Acknowledge the delivery.
    Ack(EventAck),
}

/// How a chat message's text reads as a count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedCount {
    Number(i64),
    /// Looks like a number but cannot be read as one (`12abc`, overflow).
    Unparsable,
    /// Ordinary chatter.
    NotACount,
}

/// Reject requests whose token differs from the configured verification token.
pub fn verify_token(config: &SlackConfig, token: Option<&str>) -> Result<(), ServiceError> {
    match config.verification_token.as_deref() {
        None => Ok(()),
        Some(expected) if token == Some(expected) => Ok(()),
        Some(_) => Err(ServiceError::Unauthorized(
            "invalid verification token".into(),
        )),
    }
}

/// Verify and dispatch an Events API envelope.
pub async fn handle_envelope(
    state: &SharedState,
    envelope: SlackEnvelope,
) -> Result<EventReply, ServiceError> {
    let config = &state.config().slack;
    match envelope {
        SlackEnvelope::UrlVerification { token, challenge } => {
            verify_token(config, token.as_deref())?;
            Ok(EventReply::Challenge(challenge))
        }
        SlackEnvelope::EventCallback {
            token,
            event_id,
            event,
        } => {
            verify_token(config, token.as_deref())?;
            let Some(attempt) = normalize_message(config, &event, event_id.as_deref()) else {
                return Ok(EventReply::Ack(EventAck::ignored()));
            };
            let entry = counting_service::submit(state, attempt).await?;
            Ok(EventReply::Ack(EventAck {
                outcome: Some(entry.outcome),
                sequence_id: Some(entry.sequence_id),
            }))
        }
        SlackEnvelope::Unknown => {
            debug!("ignoring unsupported Slack envelope");
            Ok(EventReply::Ack(EventAck::ignored()))
        }
    }
}

/// Turn a Slack message event into a count attempt, or `None` if it is not one.
pub fn normalize_message(
    config: &SlackConfig,
    event: &SlackInnerEvent,
    event_id: Option<&str>,
) -> Option<CountAttempt> {
    if event.kind != "message" || event.subtype.is_some() || event.bot_id.is_some() {
        return None;
    }
    let channel = event.channel.as_deref()?;
    if config
        .channel_id
        .as_deref()
        .is_some_and(|counting_channel| counting_channel != channel)
    {
        return None;
    }
    let sender = event.user.as_deref()?;

    let parsed_number = match parse_count(event.text.as_deref().unwrap_or_default()) {
        ParsedCount::Number(number) => Some(number),
        ParsedCount::Unparsable => None,
        ParsedCount::NotACount => return None,
    };

    let idempotency_key = match (event.ts.as_deref(), event_id) {
        (Some(ts), _) => Some(format!("{channel}:{ts}")),
        (None, Some(event_id)) => Some(event_id.to_owned()),
        (None, None) => None,
    };

    Some(CountAttempt {
        sender_id: sender.to_owned(),
        channel_id: channel.to_owned(),
        parsed_number,
        timestamp: event
            .ts
            .as_deref()
            .and_then(parse_slack_ts)
            .unwrap_or_else(SystemTime::now),
        idempotency_key,
    })
}

/// Read the first word of a message as a count.
pub fn parse_count(text: &str) -> ParsedCount {
    let Some(word) = text.split_whitespace().next() else {
        return ParsedCount::NotACount;
    };

    if let Ok(number) = word.parse::<i64>() {
        return ParsedCount::Number(number);
    }

    let mut chars = word.chars();
    let looks_numeric = match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('+' | '-') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    };
    if looks_numeric {
        ParsedCount::Unparsable
    } else {
        ParsedCount::NotACount
    }
}

/// Slack timestamps are fractional epoch seconds (`"1700000000.000100"`).
fn parse_slack_ts(ts: &str) -> Option<SystemTime> {
    let seconds = ts.parse::<f64>().ok()?;
    let offset = Duration::try_from_secs_f64(seconds).ok()?;
    SystemTime::UNIX_EPOCH.checked_add(offset)
}

/// Respond to the leaderboard slash command.
pub async fn leaderboard_command(
    state: &SharedState,
    form: SlashCommandForm,
) -> Result<SlashCommandResponse, ServiceError> {
    verify_token(&state.config().slack, form.token.as_deref())?;
    let limit = match validate_limit_text(&form.text) {
        Ok(limit) => limit.unwrap_or(DEFAULT_LEADERBOARD_SIZE),
        Err(err) => return Ok(usage(form.command.as_deref(), &err)),
    };

    let entries = public_service::top(state, limit).await?;
    Ok(SlashCommandResponse::ephemeral(render_leaderboard(&entries)))
}

/// Respond to the recent-events slash command.
pub async fn events_command(
    state: &SharedState,
    form: SlashCommandForm,
) -> Result<SlashCommandResponse, ServiceError> {
    verify_token(&state.config().slack, form.token.as_deref())?;
    let limit = match validate_limit_text(&form.text) {
        Ok(limit) => limit.unwrap_or(DEFAULT_EVENTS_SIZE),
        Err(err) => return Ok(usage(form.command.as_deref(), &err)),
    };

    let entries = public_service::recent(state, limit).await?;
    Ok(SlashCommandResponse::ephemeral(render_history(&entries)))
}

fn usage(command: Option<&str>, err: &validator::ValidationError) -> SlashCommandResponse {
    warn!(error = %err, "invalid slash command argument");
    let command = command.unwrap_or("/command");
    SlashCommandResponse::ephemeral(format!("{err}. Usage: `{command} [count]`"))
}

pub fn render_leaderboard(entries: &[LeaderboardEntry]) -> String {
    if entries.is_empty() {
        return "Nobody has counted yet.".to_owned();
    }

    let mut text = String::from("*Leaderboard*");
    for (rank, entry) in entries.iter().enumerate() {
        let noun = if entry.valid_count == 1 { "count" } else { "counts" };
        let _ = write!(
            text,
            "\n{}. <@{}>: {} {noun}",
            rank + 1,
            entry.user_id,
            entry.valid_count
        );
    }
    text
}

pub fn render_history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "No counting events yet.".to_owned();
    }

    let mut text = String::from("*Recent events*");
    for entry in entries {
        let posted = entry
            .attempt
            .parsed_number
            .map_or_else(|| "something unreadable".to_owned(), |n| n.to_string());
        let verdict = match entry.outcome {
            Outcome::Accepted => "counted",
            Outcome::RejectedWrongNumber => "wrong number, back to 0",
            Outcome::RejectedConsecutiveSender => "ignored, counted twice in a row",
            Outcome::RejectedDuplicate => "ignored, duplicate delivery",
            Outcome::RejectedUnparsable => "ignored, not a number",
        };
        let _ = write!(
            text,
            "\n#{} <@{}> posted {posted}: {verdict} (now at {})",
            entry.sequence_id, entry.attempt.sender_id, entry.resulting_state.last_valid_number
        );
    }
    text
}
