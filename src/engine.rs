//! Change coordinator.
//!
//! Drives one registry event through normalization, the image mirror update,
//! base image discovery and staleness propagation.
//!
//! # Module Structure
//! - `discovery`: base image edges from manifest annotations
//! - `propagation`: stale edge scan and rebuild notifications

mod discovery;
mod propagation;

use std::sync::Arc;
use std::time::Instant;

use futures::TryStreamExt;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::{Config, DiscoveryFailurePolicy, MalformedEventPolicy};
use crate::error::{Result, WatcherError};
use crate::event::{self, ChangeEvent};
use crate::metrics::Metrics;
use crate::publisher::Publisher;
use crate::reference::{ImageReference, digest_identifier, repository_of};
use crate::registry::RegistryInspector;
use crate::storage::{Database, StaleDependency};

pub use discovery::Discovery;
pub use propagation::{PropagationSummary, StalenessNotification};

/// Behavior knobs of the coordinator.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Topic staleness notifications are published to
    pub topic: String,
    pub malformed_event_policy: MalformedEventPolicy,
    pub discovery_failure_policy: DiscoveryFailurePolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            topic: "image-rebuild".to_string(),
            malformed_event_policy: MalformedEventPolicy::Drop,
            discovery_failure_policy: DiscoveryFailurePolicy::Fail,
        }
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            topic: config.rebuild_topic.clone(),
            malformed_event_policy: config.malformed_event_policy,
            discovery_failure_policy: config.discovery_failure_policy,
        }
    }
}

/// Terminal state of a successfully handled event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Action other than INSERT or DELETE
    Ignored,
    /// INSERT without tag or digest, accepted without side effects
    Dropped,
    Deleted {
        existed: bool,
    },
    Inserted {
        discovery: Option<Discovery>,
        propagation: PropagationSummary,
    },
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::Dropped => "dropped",
            Self::Deleted { .. } | Self::Inserted { .. } => "ok",
        }
    }
}

pub struct Engine {
    db: Database,
    registry: Arc<dyn RegistryInspector>,
    publisher: Arc<dyn Publisher>,
    metrics: Arc<Metrics>,
    options: EngineOptions,
}

impl Engine {
    pub fn new(
        db: Database,
        registry: Arc<dyn RegistryInspector>,
        publisher: Arc<dyn Publisher>,
        metrics: Arc<Metrics>,
        options: EngineOptions,
    ) -> Self {
        Self {
            db,
            registry,
            publisher,
            metrics,
            options,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn publisher_name(&self) -> &str {
        self.publisher.name()
    }

    /// Handle one raw notification body.
    pub async fn handle(&self, body: &[u8]) -> Result<Outcome> {
        let started = Instant::now();

        let event = match event::normalize(body) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Rejecting undecodable event");
                self.metrics
                    .record_event("UNKNOWN", "rejected", started.elapsed().as_secs_f64());
                return Err(e);
            }
        };

        let action = action_label(&event);
        let span = info_span!("notification", action = %event.action(), tag = %event.tag());
        let result = self.process(event).instrument(span).await;

        let outcome = match &result {
            Ok(outcome) => outcome.label(),
            Err(WatcherError::Decode(_)) => "rejected",
            Err(_) => "error",
        };
        self.metrics
            .record_event(action, outcome, started.elapsed().as_secs_f64());

        result
    }

    async fn process(&self, event: ChangeEvent) -> Result<Outcome> {
        match event {
            ChangeEvent::Other { action } => {
                debug!(action = %action, "Ignoring event");
                Ok(Outcome::Ignored)
            }
            ChangeEvent::Delete { tag, .. } => {
                if tag.is_empty() {
                    debug!("Ignoring DELETE without tag");
                    return Ok(Outcome::Ignored);
                }
                let existed = self.db.delete_image(repository_of(&tag), &tag).await?;
                info!(tag = %tag, existed = existed, "Image removed");
                Ok(Outcome::Deleted { existed })
            }
            ChangeEvent::Insert { tag, digest } if tag.is_empty() || digest.is_empty() => {
                match self.options.malformed_event_policy {
                    MalformedEventPolicy::Drop => {
                        warn!(tag = %tag, digest = %digest, "Dropping INSERT without tag or digest");
                        Ok(Outcome::Dropped)
                    }
                    MalformedEventPolicy::Reject => Err(WatcherError::decode(
                        "INSERT event requires both tag and digest",
                    )),
                }
            }
            ChangeEvent::Insert { tag, digest } => self.process_insert(&tag, &digest).await,
        }
    }

    async fn process_insert(&self, tag: &str, digest: &str) -> Result<Outcome> {
        let image_digest = digest_identifier(digest);
        self.db
            .upsert_image(repository_of(tag), tag, image_digest)
            .await?;
        info!(tag = %tag, digest = %image_digest, "Image updated");

        let mut deferred = None;
        let discovery = match self.discover(tag, digest).await {
            Ok(discovery) => Some(discovery),
            Err(WatcherError::Registry(e)) => {
                error!(tag = %tag, digest = %digest, error = %e, "Base image discovery failed");
                deferred = Some(e);
                None
            }
            Err(e) => return Err(e),
        };

        let propagation = self.propagate(tag, image_digest).await?;

        if let Some(e) = deferred
            && self.options.discovery_failure_policy == DiscoveryFailurePolicy::Fail
        {
            return Err(WatcherError::Registry(e));
        }

        Ok(Outcome::Inserted {
            discovery,
            propagation,
        })
    }

    /// Register a dependency edge by hand. Returns whether it was new.
    pub async fn register_dependency(
        &self,
        source_digest: &str,
        base_ref: &str,
        base_digest: &str,
    ) -> Result<bool> {
        let source_digest = digest_identifier(source_digest);
        let base_digest = digest_identifier(base_digest);
        let inserted = self
            .db
            .insert_dependency(source_digest, base_ref, base_digest)
            .await?;
        info!(
            source_digest = %source_digest,
            base_ref = %base_ref,
            base_digest = %base_digest,
            inserted = inserted,
            "Dependency registered"
        );
        Ok(inserted)
    }

    /// Mark a tag as an owned service. Returns whether it was new.
    pub async fn register_owned_service(&self, tag: &str) -> Result<bool> {
        let inserted = self.db.add_owned_service(tag).await?;
        info!(tag = %tag, inserted = inserted, "Owned service registered");
        Ok(inserted)
    }

    /// Stale dependents of a base tag. Without an explicit digest the tag's
    /// current digest is looked up in the registry.
    pub async fn stale_dependents(
        &self,
        tag: &str,
        digest: Option<&str>,
    ) -> Result<(String, Vec<StaleDependency>)> {
        let current = match digest {
            Some(digest) => digest_identifier(digest).to_string(),
            None => {
                let reference = ImageReference::parse(tag)?;
                self.registry.current_digest(&reference).await?
            }
        };

        let rows: Vec<StaleDependency> = self
            .db
            .stale_dependencies(tag, &current)
            .try_collect()
            .await?;
        Ok((current, rows))
    }
}

fn action_label(event: &ChangeEvent) -> &'static str {
    match event {
        ChangeEvent::Insert { .. } => "INSERT",
        ChangeEvent::Delete { .. } => "DELETE",
        ChangeEvent::Other { .. } => "OTHER",
    }
}
