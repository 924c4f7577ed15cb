use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Whether the counting ledger can currently be reached.
    pub store_reachable: bool,
}

impl HealthResponse {
    pub fn new(store_reachable: bool) -> Self {
        Self {
            status: if store_reachable { "ok" } else { "degraded" }.to_string(),
            store_reachable,
        }
    }
}
