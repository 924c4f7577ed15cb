use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_valid::Valid;
use tracing::error;

use crate::{
    dto::public::{
        CurrentNumberResponse, GameStateDto, HistoryResponse, LeaderboardResponse, LimitQuery,
    },
    error::AppError,
    services::public_service,
    state::SharedState,
};

const DEFAULT_LEADERBOARD_SIZE: usize = 10;
const DEFAULT_HISTORY_SIZE: usize = 20;

/// Public read-only endpoints that expose the counting game.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/currentNumber", get(get_current_number))
        .route("/api/leaderboard", get(get_leaderboard))
        .route("/api/history", get(get_history))
        .route("/api/state", get(get_state))
}

#[utoipa::path(
    get,
    path = "/api/currentNumber",
    tag = "public",
    responses(
        (status = 200, description = "Last valid number", body = CurrentNumberResponse),
        (status = 500, description = "State could not be read", content_type = "text/plain", body = String)
    )
)]
/// Return the number the channel is currently at.
pub async fn get_current_number(State(state): State<SharedState>) -> Response {
    match public_service::current_number(&state).await {
        Ok(number) => Json(CurrentNumberResponse { number }).into_response(),
        Err(err) => {
            error!(error = %err, "failed to read current number");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error retrieving number").into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/leaderboard",
    tag = "public",
    params(LimitQuery),
    responses(
        (status = 200, description = "Users ranked by accepted counts", body = LeaderboardResponse),
        (status = 400, description = "Invalid limit")
    )
)]
/// Return the top counters, best first.
pub async fn get_leaderboard(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<LimitQuery>>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let entries = public_service::top(&state, query.limit_or(DEFAULT_LEADERBOARD_SIZE)).await?;
    Ok(Json(LeaderboardResponse {
        entries: entries.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/history",
    tag = "public",
    params(LimitQuery),
    responses(
        (status = 200, description = "Most recent attempts first", body = HistoryResponse),
        (status = 400, description = "Invalid limit")
    )
)]
/// Return the latest recorded attempts with their outcomes.
pub async fn get_history(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<LimitQuery>>,
) -> Result<Json<HistoryResponse>, AppError> {
    let entries = public_service::recent(&state, query.limit_or(DEFAULT_HISTORY_SIZE)).await?;
    Ok(Json(HistoryResponse {
        entries: entries.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/state",
    tag = "public",
    responses((status = 200, description = "Committed game state", body = GameStateDto))
)]
/// Return the full committed game state.
pub async fn get_state(State(state): State<SharedState>) -> Result<Json<GameStateDto>, AppError> {
    let snapshot = public_service::snapshot(&state).await?;
    Ok(Json(snapshot.into()))
}
