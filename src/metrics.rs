//! Prometheus metrics for the watcher.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

/// Labels for inbound event metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EventLabels {
    pub action: String,
    pub outcome: String,
}

/// Labels for staleness notification metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct NotificationLabels {
    pub result: String,
}

/// Labels for event handling duration.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ActionLabels {
    pub action: String,
}

pub struct Metrics {
    pub events_total: Family<EventLabels, Counter>,
    pub event_duration_seconds: Family<ActionLabels, Histogram>,
    pub dependencies_discovered_total: Counter,
    pub notifications_total: Family<NotificationLabels, Counter>,
}

const EVENT_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

impl Metrics {
    /// Create and register all metrics with the given registry.
    pub fn new(registry: &mut Registry) -> Self {
        let events_total = Family::<EventLabels, Counter>::default();
        registry.register(
            "watcher_events",
            "Total number of registry events handled",
            events_total.clone(),
        );

        let event_duration_seconds = Family::<ActionLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(EVENT_BUCKETS.iter().copied())
        });
        registry.register(
            "watcher_event_duration_seconds",
            "Duration of registry event handling in seconds",
            event_duration_seconds.clone(),
        );

        let dependencies_discovered_total = Counter::default();
        registry.register(
            "watcher_dependencies_discovered",
            "Total number of base image dependencies recorded from manifest annotations",
            dependencies_discovered_total.clone(),
        );

        let notifications_total = Family::<NotificationLabels, Counter>::default();
        registry.register(
            "watcher_notifications",
            "Total number of staleness notifications by publish result",
            notifications_total.clone(),
        );

        Self {
            events_total,
            event_duration_seconds,
            dependencies_discovered_total,
            notifications_total,
        }
    }

    /// Metrics bound to a private registry, for callers that never export them.
    pub fn unregistered() -> Self {
        Self::new(&mut Registry::default())
    }

    pub fn record_event(&self, action: &str, outcome: &str, seconds: f64) {
        self.events_total
            .get_or_create(&EventLabels {
                action: action.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
        self.event_duration_seconds
            .get_or_create(&ActionLabels {
                action: action.to_string(),
            })
            .observe(seconds);
    }

    pub fn record_notification(&self, result: &str) {
        self.notifications_total
            .get_or_create(&NotificationLabels {
                result: result.to_string(),
            })
            .inc();
    }
}

/// Axum handler that encodes the registry as OpenMetrics text.
async fn metrics_handler(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let mut buf = String::new();
    if encode(&mut buf, &registry).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics".to_string(),
        );
    }
    (StatusCode::OK, buf)
}

/// Start the metrics server on the given port.
pub async fn serve(port: u16, registry: Arc<Registry>) -> anyhow::Result<()> {
    use axum::Router;
    use axum::routing::get;
    use tokio::net::TcpListener;
    use tracing::info;

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!(port = port, "Metrics server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
