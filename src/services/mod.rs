/// Write path: attempt validation, rule evaluation and optimistic commits.
pub mod counting_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Read-only projections of the game state, leaderboard and history.
pub mod public_service;
/// Slack event normalization and slash command rendering.
pub mod slack_service;
/// Server-Sent Events live feed.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
