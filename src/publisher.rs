pub mod log;
pub mod pubsub;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use thiserror::Error;

use crate::config::{Config, PublisherKind};

/// Failure to publish one message. Reported per stale edge and logged; it never
/// fails the event being handled.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Publish to topic {topic} failed: {source}")]
    Transport {
        topic: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Publish to topic {topic} rejected with status {status}: {body}")]
    Rejected {
        topic: String,
        status: u16,
        body: String,
    },
    #[error("Publish to topic {0} returned no message id")]
    MissingMessageId(String),
}

/// Message bus publish primitive.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one message, returning the id assigned by the bus.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<String, PublishError>;
    fn name(&self) -> &str;
}

pub struct PublisherFactory;

impl PublisherFactory {
    pub fn create(config: &Config) -> Result<Arc<dyn Publisher>> {
        match config.publisher {
            PublisherKind::Log => Ok(Arc::new(log::LogPublisher::new())),
            PublisherKind::Pubsub => {
                let project = config
                    .pubsub_project
                    .as_ref()
                    .ok_or_else(|| anyhow!("PUBSUB_PROJECT is required for the pubsub publisher"))?;
                let publisher = pubsub::PubsubPublisher::new(
                    config.pubsub_endpoint.clone(),
                    project.clone(),
                    Duration::from_secs(config.http_timeout_secs),
                )?;
                Ok(Arc::new(publisher))
            }
        }
    }
}
