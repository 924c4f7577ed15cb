use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the counting backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::public::get_current_number,
        crate::routes::public::get_leaderboard,
        crate::routes::public::get_history,
        crate::routes::public::get_state,
        crate::routes::slack::events,
        crate::routes::slack::leaderboard_command,
        crate::routes::slack::events_command,
        crate::routes::sse::public_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::public::CurrentNumberResponse,
            crate::dto::public::LeaderboardResponse,
            crate::dto::public::LeaderboardEntryDto,
            crate::dto::public::HistoryResponse,
            crate::dto::public::HistoryEntryDto,
            crate::dto::public::GameStateDto,
            crate::dto::slack::EventAck,
            crate::dto::slack::SlashCommandResponse,
            crate::dto::sse::AttemptEvent,
            crate::dto::sse::Handshake,
            crate::state::counting::Outcome,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "public", description = "Read-only game state, leaderboard and history"),
        (name = "slack", description = "Slack Events API and slash command webhooks"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;
