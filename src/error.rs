//! Error types for the media edge server
//!
//! Provides unified error handling using thiserror. Every variant carries
//! owned strings so a single result can be handed to every caller waiting on
//! a coalesced fetch.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cdn Error Enum ==
/// Unified error type for the media edge server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CdnError {
    /// Entry is absent or expired; triggers the fetch path
    #[error("Not cached: {0}")]
    NotCached(String),

    /// Request rejected before touching the store
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Origin or generation backend answered with a non-success status
    #[error("Origin returned {status}: {message}")]
    Origin { status: u16, message: String },

    /// Origin or generation backend did not answer in time
    #[error("Upstream timed out: {0}")]
    Timeout(String),

    /// Image decode or encode failure
    #[error("Codec error: {0}")]
    Codec(String),

    /// Key-value store or transaction failure
    #[error("Store error: {0}")]
    Store(String),

    /// Admin route addressed a namespace that does not exist
    #[error("Unknown namespace: {0}")]
    UnknownNamespace(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CdnError {
    /// Status code this error maps to at the HTTP boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // never a 5xx: a miss that escaped the fetch path is still a miss
            CdnError::NotCached(_) => StatusCode::NOT_FOUND,
            CdnError::Validation(_) => StatusCode::BAD_REQUEST,
            CdnError::Origin { status: 404, .. } => StatusCode::NOT_FOUND,
            CdnError::Origin { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            CdnError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CdnError::Codec(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CdnError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CdnError::UnknownNamespace(_) => StatusCode::NOT_FOUND,
            CdnError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// == Conversions ==
impl From<sled::Error> for CdnError {
    fn from(err: sled::Error) -> Self {
        CdnError::Store(err.to_string())
    }
}

impl From<image::ImageError> for CdnError {
    fn from(err: image::ImageError) -> Self {
        CdnError::Codec(err.to_string())
    }
}

impl From<reqwest::Error> for CdnError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return CdnError::Timeout(err.to_string());
        }
        match err.status() {
            Some(status) => CdnError::Origin {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => CdnError::Origin {
                status: StatusCode::BAD_GATEWAY.as_u16(),
                message: err.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for CdnError {
    fn from(err: serde_json::Error) -> Self {
        CdnError::Store(format!("corrupt record: {}", err))
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CdnError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the media edge server.
pub type Result<T> = std::result::Result<T, CdnError>;
