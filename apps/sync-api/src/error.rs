//! API error type and the HTTP status mapping for engine errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orderly_sync::SyncError;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to HTTP clients.
///
/// Engine errors convert via `From<SyncError>`; handler-level failures
/// (bad headers, malformed query parameters, missing permissions) are
/// constructed directly.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Validation(e) => ApiError::BadRequest(e.to_string()),
            SyncError::BatchTooLarge { .. } => ApiError::BadRequest(err.to_string()),
            SyncError::InvalidResolutionStrategy { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            SyncError::InvalidMergedData(_) => ApiError::BadRequest(err.to_string()),
            SyncError::Mutation(_) => ApiError::BadRequest(err.to_string()),
            SyncError::ConflictNotFound(id) => {
                ApiError::NotFound(format!("conflict not found: {id}"))
            }
            SyncError::Storage(e) => ApiError::Unavailable(e.to_string()),
            SyncError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, error = %self, "request failed");
        } else {
            tracing::debug!(%status, error = %self, "request rejected");
        }
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
