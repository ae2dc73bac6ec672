//! Error types for the cache server
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::backend::BackendKind;
use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache and its backends.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key absent or expired; the two causes are deliberately not distinguished
    #[error("Cache miss: {0}")]
    Miss(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A remote backend could not be reached or answered with an error
    #[error("{backend} backend unavailable: {message}")]
    Backend {
        backend: BackendKind,
        message: String,
    },

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Builds a [`CacheError::Backend`] from any displayable failure.
    pub fn backend(backend: BackendKind, err: impl std::fmt::Display) -> Self {
        CacheError::Backend {
            backend,
            message: err.to_string(),
        }
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CacheError::Miss(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Backend { .. } => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Serialization(_) | CacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache server.
pub type Result<T> = std::result::Result<T, CacheError>;
