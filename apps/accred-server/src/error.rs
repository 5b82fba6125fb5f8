//! API error taxonomy and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use accred_storage::StoreError;

/// Errors surfaced to API callers as `{"error": "..."}` bodies.
///
/// Invalid tokens are always reported with the same generic message so
/// the endpoint does not leak which tokens exist.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    /// A lifecycle transition was attempted from a state that does not
    /// allow it (already used, declined, expired, or lost race).
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    /// Persistence failure; safe for the caller to retry.
    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    /// The uniform response for unknown or garbled invite tokens.
    pub fn invalid_invite() -> Self {
        ApiError::NotFound("invalid invite".to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidState(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(%detail, "request failed");
        }
        let message = match &self {
            // Backend details stay out of responses.
            ApiError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        (self.status_code(), Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound("not found".to_string()),
            StoreError::AlreadyExists => ApiError::InvalidState("already exists".to_string()),
            StoreError::Conflict => ApiError::InvalidState("no longer valid".to_string()),
            StoreError::Backend(msg) => ApiError::Internal(msg),
        }
    }
}
