use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

// ============================================
// Environment variable name constants
// ============================================
pub mod env {
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
    pub const PORT: &str = "PORT";
    pub const HEALTH_PORT: &str = "HEALTH_PORT";
    pub const METRICS_PORT: &str = "METRICS_PORT";
    pub const STORAGE_PATH: &str = "STORAGE_PATH";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const OWNED_SERVICES: &str = "OWNED_SERVICES";
    pub const PUBLISHER: &str = "PUBLISHER";
    pub const PUBSUB_ENDPOINT: &str = "PUBSUB_ENDPOINT";
    pub const PUBSUB_PROJECT: &str = "PUBSUB_PROJECT";
    pub const REBUILD_TOPIC: &str = "REBUILD_TOPIC";
    pub const REGISTRY_PLAIN_HTTP: &str = "REGISTRY_PLAIN_HTTP";
    pub const HTTP_TIMEOUT_SECS: &str = "HTTP_TIMEOUT_SECS";
    pub const MALFORMED_EVENT_POLICY: &str = "MALFORMED_EVENT_POLICY";
    pub const DISCOVERY_FAILURE_POLICY: &str = "DISCOVERY_FAILURE_POLICY";
    pub const ALLOWED_ORIGINS: &str = "ALLOWED_ORIGINS";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublisherKind {
    /// Write staleness notifications to the log
    Log,
    /// Publish staleness notifications through the Pub/Sub REST API
    Pubsub,
}

/// What to do with an INSERT event that lacks a tag or digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedEventPolicy {
    /// Accept with success and no side effects
    Drop,
    /// Answer with a client error
    Reject,
}

/// What to do when base image discovery fails on the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryFailurePolicy {
    /// Finish propagation, then answer with a server error so the event is redelivered
    Fail,
    /// Log and answer with success
    Ignore,
}

impl std::fmt::Display for PublisherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublisherKind::Log => write!(f, "log"),
            PublisherKind::Pubsub => write!(f, "pubsub"),
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show version information
    Version,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "base-image-watcher",
    version,
    about = "Tracks base image dependencies and triggers rebuilds of stale images",
    long_about = "Receives container registry notifications, records which images are built on which base images, and publishes a rebuild notification for every owned image whose base image tag moved to a new digest."
)]
pub struct Config {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Log format
    #[arg(long, env = env::LOG_FORMAT, value_enum, default_value = "json")]
    pub log_format: LogFormat,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, env = env::LOG_LEVEL, default_value = "info")]
    pub log_level: String,

    /// API server port
    #[arg(long, env = env::PORT, default_value = "8080")]
    pub port: u16,

    /// Health check server port
    #[arg(long, env = env::HEALTH_PORT, default_value = "8081")]
    pub health_port: u16,

    /// Prometheus metrics port (0 to disable)
    #[arg(long, env = env::METRICS_PORT, default_value = "9090")]
    pub metrics_port: u16,

    /// Directory holding the SQLite database
    #[arg(long, env = env::STORAGE_PATH, default_value = "/data")]
    pub storage_path: String,

    /// SQLite connection URL, overrides STORAGE_PATH
    #[arg(long, env = env::DATABASE_URL)]
    pub database_url: Option<String>,

    /// Owned service tags eligible for automatic rebuilds, comma-separated
    #[arg(long, env = env::OWNED_SERVICES, value_delimiter = ',')]
    pub owned_services: Vec<String>,

    /// Message bus used for staleness notifications
    #[arg(long, env = env::PUBLISHER, value_enum, default_value = "log")]
    pub publisher: PublisherKind,

    /// Pub/Sub REST endpoint
    #[arg(long, env = env::PUBSUB_ENDPOINT, default_value = "https://pubsub.googleapis.com")]
    pub pubsub_endpoint: String,

    /// Pub/Sub project (pubsub publisher only)
    #[arg(long, env = env::PUBSUB_PROJECT)]
    pub pubsub_project: Option<String>,

    /// Topic receiving staleness notifications
    #[arg(long, env = env::REBUILD_TOPIC, default_value = "image-rebuild")]
    pub rebuild_topic: String,

    /// Talk to registries over plain HTTP
    #[arg(long, env = env::REGISTRY_PLAIN_HTTP, default_value = "false")]
    pub registry_plain_http: bool,

    /// Transport timeout for registry and bus requests in seconds
    #[arg(long, env = env::HTTP_TIMEOUT_SECS, default_value = "30")]
    pub http_timeout_secs: u64,

    /// Handling of INSERT events without tag or digest
    #[arg(long, env = env::MALFORMED_EVENT_POLICY, value_enum, default_value = "drop")]
    pub malformed_event_policy: MalformedEventPolicy,

    /// Handling of registry failures during base image discovery
    #[arg(long, env = env::DISCOVERY_FAILURE_POLICY, value_enum, default_value = "fail")]
    pub discovery_failure_policy: DiscoveryFailurePolicy,

    /// CORS allowed origins, comma-separated (empty = any)
    #[arg(long, env = env::ALLOWED_ORIGINS, value_delimiter = ',')]
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_args() -> Self {
        Config::parse()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.publisher == PublisherKind::Pubsub && self.pubsub_project.is_none() {
            return Err("PUBSUB_PROJECT is required when PUBLISHER=pubsub".to_string());
        }
        if self.rebuild_topic.trim().is_empty() {
            return Err("REBUILD_TOPIC must not be empty".to_string());
        }
        if self.http_timeout_secs == 0 {
            return Err("HTTP_TIMEOUT_SECS must be greater than zero".to_string());
        }
        Ok(())
    }

    /// SQLite connection URL
    pub fn get_database_url(&self) -> String {
        match &self.database_url {
            Some(url) => url.clone(),
            None => format!(
                "sqlite://{}/watcher.db",
                self.storage_path.trim_end_matches('/')
            ),
        }
    }

    /// Owned service tags with blanks removed
    pub fn get_owned_services(&self) -> Vec<String> {
        self.owned_services
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
