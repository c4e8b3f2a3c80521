pub mod api;

use anyhow::Result;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::health::HealthServer;
use api::AppState;

/// Build the API router.
pub fn router(engine: Arc<Engine>, allowed_origins: &[String]) -> Router {
    let state = AppState { engine };

    Router::new()
        // Event intake
        .route("/notification", post(api::receive_notification))
        .route("/watch", post(api::watch))
        .route("/ping", get(api::ping))
        .route("/healthz", get(api::healthz))
        // Operator API
        .route("/api/v1/images", get(api::list_images))
        .route("/api/v1/dependencies", get(api::list_dependencies))
        .route("/api/v1/services", get(api::list_services))
        .route("/api/v1/stale", get(api::list_stale))
        .route("/api/v1/version", get(api::get_version))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

pub async fn run(
    port: u16,
    engine: Arc<Engine>,
    allowed_origins: Vec<String>,
    health_server: HealthServer,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    let app = router(engine, &allowed_origins);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(addr = %addr, "Server listening");

    // Mark as ready
    health_server.set_ready(true);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            info!("Server shutting down");
        })
        .await?;

    health_server.set_ready(false);
    Ok(())
}
