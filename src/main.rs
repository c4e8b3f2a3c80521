use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use prometheus_client::registry::Registry;
use tracing::{error, info};

use base_image_watcher::config::{Command, Config};
use base_image_watcher::engine::{Engine, EngineOptions};
use base_image_watcher::health::HealthServer;
use base_image_watcher::metrics::{self, Metrics};
use base_image_watcher::publisher::PublisherFactory;
use base_image_watcher::registry::RegistryClient;
use base_image_watcher::storage::Database;
use base_image_watcher::{logging, server};

const GIT_SHA: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

const BUILD_TIMESTAMP: &str = match option_env!("VERGEN_BUILD_TIMESTAMP") {
    Some(ts) => ts,
    None => "unknown",
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_args();

    // Handle version subcommand
    if let Some(Command::Version) = &config.command {
        println!(
            "base-image-watcher {}, commit: {}, build_date: {}",
            env!("CARGO_PKG_VERSION"),
            GIT_SHA,
            BUILD_TIMESTAMP,
        );
        return Ok(());
    }

    logging::init(config.log_format, &config.log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = GIT_SHA,
        build_date = BUILD_TIMESTAMP,
        publisher = %config.publisher,
        topic = %config.rebuild_topic,
        "base-image-watcher starting"
    );

    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration validation failed");
        std::process::exit(1);
    }

    // Start health check server
    let health_port = config.health_port;
    let health_server = HealthServer::new();
    let health_server_clone = health_server.clone();

    let (health_ready_tx, health_ready_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if let Err(e) = health_server_clone
            .serve(health_port, health_ready_tx)
            .await
        {
            error!(error = %e, "Health check server failed");
        }
    });

    health_ready_rx.await.ok();
    info!(port = health_port, "Health check server started");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let result = tokio::select! {
        result = run(config, health_server, shutdown_rx) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
            Ok(())
        }
    };

    if let Err(e) = result {
        error!(error = %format!("{:#}", e), "Application error");
        std::process::exit(1);
    }

    info!("Shutdown complete");
    Ok(())
}

async fn run(
    config: Config,
    health_server: HealthServer,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    let db = Database::connect(&config.get_database_url()).await?;

    for tag in config.get_owned_services() {
        let inserted = db
            .add_owned_service(&tag)
            .await
            .with_context(|| format!("Failed to seed owned service {}", tag))?;
        info!(tag = %tag, inserted = inserted, "Owned service seeded");
    }

    let mut registry = Registry::default();
    let metrics = Arc::new(Metrics::new(&mut registry));
    if config.metrics_port > 0 {
        let metrics_port = config.metrics_port;
        let registry = Arc::new(registry);
        tokio::spawn(async move {
            if let Err(e) = metrics::serve(metrics_port, registry).await {
                error!(error = %e, "Metrics server failed");
            }
        });
    }

    let timeout = Duration::from_secs(config.http_timeout_secs);
    let registry_client = RegistryClient::new(timeout, config.registry_plain_http)
        .context("Failed to build registry client")?;
    let publisher = PublisherFactory::create(&config)?;
    info!(publisher = publisher.name(), "Publisher initialized");

    let engine = Arc::new(Engine::new(
        db,
        Arc::new(registry_client),
        publisher,
        metrics,
        EngineOptions::from(&config),
    ));

    server::run(
        config.port,
        engine,
        config.allowed_origins.clone(),
        health_server,
        shutdown_rx,
    )
    .await
}
