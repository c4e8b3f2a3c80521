use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::publisher::{PublishError, Publisher};

/// Writes notifications to the log instead of a bus. Useful locally and in
/// dry-run deployments.
pub struct LogPublisher {
    next_id: AtomicU64,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for LogPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<String, PublishError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        info!(
            topic = %topic,
            message_id = %id,
            payload = %String::from_utf8_lossy(payload),
            "Published message"
        );
        Ok(id)
    }

    fn name(&self) -> &str {
        "log"
    }
}
