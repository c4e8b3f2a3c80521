//! Staleness propagation

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::Engine;
use crate::error::Result;
use crate::storage::StaleDependency;

/// Message published for each stale owned dependent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StalenessNotification {
    /// Owned tag of the image that needs a rebuild
    pub tag: String,
    pub source_digest: String,
    pub base_ref: String,
    pub base_digest: String,
    pub current_base_digest: String,
}

impl StalenessNotification {
    fn new(tag: &str, row: &StaleDependency, current_base_digest: &str) -> Self {
        Self {
            tag: tag.to_string(),
            source_digest: row.source_digest.clone(),
            base_ref: row.base_ref.clone(),
            base_digest: row.base_digest.clone(),
            current_base_digest: current_base_digest.to_string(),
        }
    }
}

/// Counts from one propagation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationSummary {
    pub stale: usize,
    pub notified: usize,
    /// Stale edges whose image is not an owned service
    pub skipped: usize,
    pub failed: usize,
}

impl Engine {
    /// Notify owned dependents built against a digest of `tag` other than `digest`.
    ///
    /// The row stream is always drained. Publish failures are logged and
    /// counted; a store failure is reported once the stream has ended.
    pub(super) async fn propagate(&self, tag: &str, digest: &str) -> Result<PropagationSummary> {
        let mut summary = PropagationSummary::default();
        let mut store_error = None;

        let mut rows = self.db.stale_dependencies(tag, digest);
        while let Some(row) = rows.next().await {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    error!(base_ref = %tag, error = %e, "Failed to read stale dependency");
                    if store_error.is_none() {
                        store_error = Some(e);
                    }
                    continue;
                }
            };
            summary.stale += 1;

            let Some(owned_tag) = row.owned_tag.as_deref() else {
                debug!(
                    source_digest = %row.source_digest,
                    image_tag = ?row.image_tag,
                    "Stale dependent is not an owned service"
                );
                summary.skipped += 1;
                self.metrics.record_notification("skipped");
                continue;
            };

            let notification = StalenessNotification::new(owned_tag, &row, digest);
            let payload = match serde_json::to_vec(&notification) {
                Ok(payload) => payload,
                Err(e) => {
                    error!(tag = %owned_tag, error = %e, "Failed to encode staleness notification");
                    summary.failed += 1;
                    self.metrics.record_notification("failed");
                    continue;
                }
            };

            match self.publisher.publish(&self.options.topic, &payload).await {
                Ok(message_id) => {
                    info!(
                        tag = %owned_tag,
                        source_digest = %row.source_digest,
                        base_digest = %row.base_digest,
                        current_base_digest = %digest,
                        message_id = %message_id,
                        "Rebuild requested"
                    );
                    summary.notified += 1;
                    self.metrics.record_notification("published");
                }
                Err(e) => {
                    warn!(tag = %owned_tag, error = %e, "Failed to publish staleness notification");
                    summary.failed += 1;
                    self.metrics.record_notification("failed");
                }
            }
        }
        drop(rows);

        if let Some(e) = store_error {
            return Err(e.into());
        }

        if summary.stale > 0 {
            info!(
                base_ref = %tag,
                stale = summary.stale,
                notified = summary.notified,
                skipped = summary.skipped,
                failed = summary.failed,
                "Staleness propagation finished"
            );
        }
        Ok(summary)
    }
}
