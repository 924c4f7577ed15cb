use axum::{
    Form, Json, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
};
use tracing::info;

use crate::{
    dto::slack::{EventAck, SlackEnvelope, SlashCommandForm, SlashCommandResponse},
    error::AppError,
    services::slack_service::{self, EventReply},
    state::SharedState,
};

/// Slack webhooks: the Events API endpoint and the slash commands.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/slack/events", post(events))
        .route("/slack/leaderboard", post(leaderboard_command))
        .route("/slack/eventsCommand", post(events_command))
}

#[utoipa::path(
    post,
    path = "/slack/events",
    tag = "slack",
    request_body(content = String, content_type = "application/json", description = "Slack Events API envelope"),
    responses(
        (status = 200, description = "Challenge echo or attempt outcome", body = EventAck),
        (status = 401, description = "Verification token mismatch"),
        (status = 503, description = "Ledger unavailable, Slack will redeliver")
    )
)]
/// Receive Slack events: answer URL verification and count channel messages.
pub async fn events(
    State(state): State<SharedState>,
    Json(envelope): Json<SlackEnvelope>,
) -> Result<Response, AppError> {
    match slack_service::handle_envelope(&state, envelope).await? {
        EventReply::Challenge(challenge) => {
            info!("answered Slack URL verification");
            Ok(challenge.into_response())
        }
        EventReply::Ack(ack) => Ok(Json::<EventAck>(ack).into_response()),
    }
}

#[utoipa::path(
    post,
    path = "/slack/leaderboard",
    tag = "slack",
    request_body(content = String, content_type = "application/x-www-form-urlencoded", description = "Slash command form"),
    responses(
        (status = 200, description = "Rendered leaderboard", body = SlashCommandResponse),
        (status = 401, description = "Verification token mismatch")
    )
)]
/// Render the leaderboard for the `/leaderboard [count]` slash command.
pub async fn leaderboard_command(
    State(state): State<SharedState>,
    Form(form): Form<SlashCommandForm>,
) -> Result<Json<SlashCommandResponse>, AppError> {
    Ok(Json(slack_service::leaderboard_command(&state, form).await?))
}

#[utoipa::path(
    post,
    path = "/slack/eventsCommand",
    tag = "slack",
    request_body(content = String, content_type = "application/x-www-form-urlencoded", description = "Slash command form"),
    responses(
        (status = 200, description = "Rendered recent attempts", body = SlashCommandResponse),
        (status = 401, description = "Verification token mismatch")
    )
)]
/// Render recent attempts for the `/events [count]` slash command.
pub async fn events_command(
    State(state): State<SharedState>,
    Form(form): Form<SlashCommandForm>,
) -> Result<Json<SlashCommandResponse>, AppError> {
    Ok(Json(slack_service::events_command(&state, form).await?))
}
