//! Read-only access to the container registry.
//!
//! # Module Structure
//! - `client`: OCI distribution API client over HTTP
//! - `manifest`: manifest document types and base image annotations

mod client;
mod manifest;

use async_trait::async_trait;
use thiserror::Error;

use crate::reference::ImageReference;

pub use client::RegistryClient;
pub use manifest::{ANNOTATION_BASE_DIGEST, ANNOTATION_BASE_NAME, BaseImage, Manifest};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid image reference: {0}")]
    InvalidReference(String),
    #[error("Manifest not found: {0}")]
    ManifestNotFound(String),
    #[error("Registry returned status {status} for {reference}")]
    UnexpectedStatus { status: u16, reference: String },
    #[error("Registry response for {0} carries no digest")]
    MissingDigest(String),
    #[error("Malformed manifest for {reference}: {reason}")]
    MalformedManifest { reference: String, reason: String },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Registry lookups needed by the engine.
#[async_trait]
pub trait RegistryInspector: Send + Sync {
    /// Fetch the manifest a reference points at.
    async fn resolve_reference(&self, reference: &ImageReference) -> Result<Manifest, RegistryError>;

    /// Digest currently published under a tag reference.
    async fn current_digest(&self, reference: &ImageReference) -> Result<String, RegistryError>;
}
