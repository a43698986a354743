//! Error types for scdha-web
//!
//! Retrieval misses always answer `404 {"detail": "Item not found"}`; the
//! internal reason is only logged. Everything else answers `{"error": ...}`.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Body detail for every 404
pub const NOT_FOUND_DETAIL: &str = "Item not found";

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Request failed validation (422)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Malformed multipart body (status decided by axum)
    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// scdha-common error
    #[error("Common error: {0}")]
    Common(#[from] scdha_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(reason) => {
                tracing::debug!(reason = %reason, "Responding 404");
                return not_found();
            }
            ApiError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Multipart(err) => (err.status(), err.body_text()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Io(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::Common(scdha_common::Error::NotFound(reason)) => {
                tracing::debug!(reason = %reason, "Responding 404");
                return not_found();
            }
            ApiError::Common(scdha_common::Error::InvalidInput(msg)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg)
            }
            ApiError::Common(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = %message, "Request failed");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "detail": NOT_FOUND_DETAIL })),
    )
        .into_response()
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
