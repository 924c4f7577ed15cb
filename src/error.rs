use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::dao::storage::StorageError;

/// Errors that can occur in service layer operations.
///
/// Rejected attempts are not errors; they are reported as
/// [`Outcome`](crate::state::counting::Outcome) values.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The normalized attempt is missing required fields.
    #[error("invalid attempt: {0}")]
    InvalidAttempt(String),
    /// Optimistic commits kept conflicting with concurrent writers.
    #[error("store busy after {attempts} commit attempt(s)")]
    StoreBusy {
        /// Number of commit attempts made before giving up.
        attempts: u32,
    },
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    StoreUnavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Operation exceeded its deadline.
    #[error("operation timed out")]
    Timeout,
    /// Request could not be authenticated.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ServiceError {
    /// Whether retrying the whole call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::StoreBusy { .. }
                | ServiceError::StoreUnavailable(_)
                | ServiceError::Degraded
                | ServiceError::Timeout
        )
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::StoreUnavailable(err)
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidAttempt(err.to_string())
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Conflict with concurrent writers; the request can be retried.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidAttempt(message) | ServiceError::InvalidInput(message) => {
                AppError::BadRequest(message)
            }
            ServiceError::StoreBusy { attempts } => {
                AppError::Conflict(format!("store busy after {attempts} attempt(s)"))
            }
            ServiceError::StoreUnavailable(source) => {
                AppError::ServiceUnavailable(source.to_string())
            }
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Timeout => AppError::ServiceUnavailable("operation timed out".into()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
