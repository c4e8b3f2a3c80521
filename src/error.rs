//! Error taxonomy for notification handling.
//!
//! Callers only ever see a coarse status code; the variant decides which one.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::registry::RegistryError;

/// Errors that can abort the handling of a single inbound event.
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Failed to decode event: {0}")]
    Decode(String),

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl WatcherError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Status code reported to the delivering system.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) | Self::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether redelivering the same event could succeed.
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

impl From<serde_json::Error> for WatcherError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl IntoResponse for WatcherError {
    fn into_response(self) -> Response {
        self.status_code().into_response()
    }
}

pub type Result<T, E = WatcherError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_is_client_error() {
        let err = WatcherError::decode("missing action");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Failed to decode event: missing action");
    }

    #[test]
    fn test_store_is_server_error() {
        let err = WatcherError::from(sqlx::Error::PoolClosed);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_registry_is_server_error() {
        let err = WatcherError::from(RegistryError::ManifestNotFound(
            "repo/app@sha256:abc".to_string(),
        ));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("repo/app@sha256:abc"));
    }

    #[test]
    fn test_json_error_maps_to_decode() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = WatcherError::from(json_err);
        assert!(matches!(err, WatcherError::Decode(_)));
    }

    #[test]
    fn test_into_response_has_coarse_status() {
        let response = WatcherError::decode("bad").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
