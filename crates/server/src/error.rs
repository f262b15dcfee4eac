//! Errors returned by the HTTP handlers, rendered as `{code, message}` JSON.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// Anything a handler can fail with before the response starts.
///
/// Failures after streaming has begun are reported through the
/// `X-Streaming-Error` trailer instead.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] logvault_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] logvault_metadata::MetadataError),

    #[error("invalid request: {0}")]
    Core(#[from] logvault_core::Error),

    #[error("retrieval error: {0}")]
    Retrieval(#[from] logvault_retrieval::RetrievalError),
}

impl ApiError {
    /// Machine-readable code. Retrieval failures report which stage failed.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) | Self::Core(_) => "bad_request",
            Self::Forbidden(_) => "forbidden",
            Self::Internal(_) => "internal_error",
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Retrieval(e) => e.kind(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Core(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) | Self::Storage(_) | Self::Metadata(_) | Self::Retrieval(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::info!(error = %self, "request rejected");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
