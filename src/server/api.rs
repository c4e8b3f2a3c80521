use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::engine::Engine;
use crate::error::WatcherError;
use crate::storage::StaleDependency;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Body of `/watch`: either a dependency edge or an owned service tag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WatchRequest {
    Dependency {
        #[serde(alias = "sourceDigest")]
        source_digest: String,
        #[serde(alias = "baseDigest")]
        base_digest: String,
        #[serde(alias = "baseRef")]
        base_ref: String,
    },
    Service {
        tag: String,
    },
}

impl WatchRequest {
    fn is_complete(&self) -> bool {
        match self {
            Self::Dependency {
                source_digest,
                base_digest,
                base_ref,
            } => !source_digest.is_empty() && !base_digest.is_empty() && !base_ref.is_empty(),
            Self::Service { tag } => !tag.is_empty(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StaleQuery {
    pub tag: Option<String>,
    pub digest: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Generic list response
#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleResponse {
    pub tag: String,
    pub current_digest: String,
    pub items: Vec<StaleDependency>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// ============================================
// Handlers
// ============================================

/// Registry notification, bare or wrapped in a push envelope.
/// Only the status code is reported back.
pub async fn receive_notification(State(state): State<AppState>, body: Bytes) -> StatusCode {
    match state.engine.handle(&body).await {
        Ok(outcome) => {
            debug!(outcome = ?outcome, "Notification handled");
            StatusCode::OK
        }
        Err(e @ WatcherError::Decode(_)) => {
            warn!(error = %e, "Rejected notification");
            e.status_code()
        }
        Err(e) => {
            error!(error = %e, retryable = e.is_retryable(), "Failed to handle notification");
            e.status_code()
        }
    }
}

/// Register a dependency edge or an owned service.
pub async fn watch(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let request: WatchRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Invalid watch request");
            return StatusCode::BAD_REQUEST;
        }
    };
    if !request.is_complete() {
        warn!(request = ?request, "Watch request has empty fields");
        return StatusCode::BAD_REQUEST;
    }

    let result = match &request {
        WatchRequest::Dependency {
            source_digest,
            base_digest,
            base_ref,
        } => {
            state
                .engine
                .register_dependency(source_digest, base_ref, base_digest)
                .await
        }
        WatchRequest::Service { tag } => state.engine.register_owned_service(tag).await,
    };

    match result {
        Ok(true) => StatusCode::CREATED,
        Ok(false) => {
            info!(request = ?request, "Watch entry already present");
            StatusCode::OK
        }
        Err(e) => {
            error!(error = %e, "Failed to register watch entry");
            e.status_code()
        }
    }
}

pub async fn ping() -> StatusCode {
    StatusCode::OK
}

pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
        }),
    )
}

pub async fn list_images(State(state): State<AppState>) -> Response {
    match state.engine.database().list_images().await {
        Ok(items) => {
            let total = items.len();
            (StatusCode::OK, Json(ListResponse { items, total })).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to list images");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list images")
        }
    }
}

pub async fn list_dependencies(State(state): State<AppState>) -> Response {
    match state.engine.database().list_dependencies().await {
        Ok(items) => {
            let total = items.len();
            (StatusCode::OK, Json(ListResponse { items, total })).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to list dependencies");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list dependencies",
            )
        }
    }
}

pub async fn list_services(State(state): State<AppState>) -> Response {
    match state.engine.database().list_owned_services().await {
        Ok(items) => {
            let total = items.len();
            (StatusCode::OK, Json(ListResponse { items, total })).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to list owned services");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list owned services",
            )
        }
    }
}

/// Dependents built against an outdated digest of a base tag
pub async fn list_stale(State(state): State<AppState>, Query(query): Query<StaleQuery>) -> Response {
    let Some(tag) = query.tag.filter(|t| !t.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "tag is required");
    };
    let digest = query.digest.filter(|d| !d.is_empty());

    match state.engine.stale_dependents(&tag, digest.as_deref()).await {
        Ok((current_digest, items)) => {
            let total = items.len();
            (
                StatusCode::OK,
                Json(StaleResponse {
                    tag,
                    current_digest,
                    items,
                    total,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(tag = %tag, error = %e, "Failed to query stale dependents");
            error_response(e.status_code(), e.to_string())
        }
    }
}

/// Version info response
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub commit: String,
    pub build_date: String,
    pub publisher: String,
}

pub async fn get_version(State(state): State<AppState>) -> impl IntoResponse {
    let version = VersionResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: option_env!("VERGEN_GIT_SHA").unwrap_or("unknown").to_string(),
        build_date: option_env!("VERGEN_BUILD_TIMESTAMP")
            .unwrap_or("unknown")
            .to_string(),
        publisher: state.engine.publisher_name().to_string(),
    };
    (StatusCode::OK, Json(version))
}
