//! Base image discovery from manifest annotations

use tracing::{debug, info};

use super::Engine;
use crate::error::Result;
use crate::reference::{ImageReference, digest_identifier, repository_of};
use crate::registry::{BaseImage, RegistryError};

/// Result of inspecting a freshly pushed image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// A new edge was written
    Recorded(BaseImage),
    /// The image already had an edge; the first one is kept
    AlreadyKnown(BaseImage),
    /// The manifest names no base image
    NoBaseImage,
}

impl Engine {
    /// Inspect the pushed image and record its base edge.
    ///
    /// `digest` is the event's digest reference (`repo/app@sha256:...`); a bare
    /// digest is qualified with the tag's repository.
    pub(super) async fn discover(&self, tag: &str, digest: &str) -> Result<Discovery> {
        let target = if digest.contains('@') {
            digest.to_string()
        } else {
            format!("{}@{}", repository_of(tag), digest)
        };
        let reference = ImageReference::parse(&target)?;

        let manifest = self.registry.resolve_reference(&reference).await?;
        let Some(base) = manifest.base_image() else {
            debug!(reference = %reference, "Manifest carries no base image annotations");
            return Ok(Discovery::NoBaseImage);
        };

        // The pinned base must itself be a valid reference
        ImageReference::parse(&format!("{}@{}", base.name, base.digest)).map_err(|e| {
            RegistryError::InvalidReference(format!(
                "base image annotations {}@{}: {}",
                base.name, base.digest, e
            ))
        })?;

        let source_digest = digest_identifier(digest);
        let inserted = self
            .db
            .insert_dependency(source_digest, &base.name, &base.digest)
            .await?;

        if inserted {
            self.metrics.dependencies_discovered_total.inc();
            info!(
                source_digest = %source_digest,
                base_ref = %base.name,
                base_digest = %base.digest,
                "Base image dependency recorded"
            );
            Ok(Discovery::Recorded(base))
        } else {
            debug!(source_digest = %source_digest, "Base image dependency already known");
            Ok(Discovery::AlreadyKnown(base))
        }
    }
}
