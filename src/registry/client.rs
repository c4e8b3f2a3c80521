use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use tracing::debug;

use super::manifest::Manifest;
use super::{RegistryError, RegistryInspector};
use crate::reference::ImageReference;

/// Docker Hub serves its API from a different host than its references name.
const DOCKER_HUB: &str = "docker.io";
const DOCKER_HUB_API: &str = "registry-1.docker.io";

const DIGEST_HEADER: &str = "Docker-Content-Digest";

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.manifest.v1+json, \
    application/vnd.oci.image.index.v1+json, \
    application/vnd.docker.distribution.manifest.v2+json, \
    application/vnd.docker.distribution.manifest.list.v2+json";

/// Anonymous OCI distribution API client.
#[derive(Clone)]
pub struct RegistryClient {
    client: Client,
    plain_http: bool,
}

impl RegistryClient {
    pub fn new(timeout: Duration, plain_http: bool) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, plain_http })
    }

    fn manifest_url(&self, reference: &ImageReference) -> String {
        let scheme = if self.plain_http { "http" } else { "https" };
        let host = if reference.registry == DOCKER_HUB {
            DOCKER_HUB_API
        } else {
            reference.registry.as_str()
        };
        format!(
            "{}://{}/v2/{}/manifests/{}",
            scheme,
            host,
            reference.repository,
            reference.manifest_reference()
        )
    }

    fn check_status(status: StatusCode, reference: &ImageReference) -> Result<(), RegistryError> {
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            Err(RegistryError::ManifestNotFound(reference.to_string()))
        } else {
            Err(RegistryError::UnexpectedStatus {
                status: status.as_u16(),
                reference: reference.to_string(),
            })
        }
    }
}

#[async_trait]
impl RegistryInspector for RegistryClient {
    async fn resolve_reference(&self, reference: &ImageReference) -> Result<Manifest, RegistryError> {
        let url = self.manifest_url(reference);
        debug!(url = %url, "Fetching manifest");

        let resp = self
            .client
            .get(&url)
            .header(header::ACCEPT, MANIFEST_ACCEPT)
            .send()
            .await?;
        Self::check_status(resp.status(), reference)?;

        let body = resp.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| RegistryError::MalformedManifest {
            reference: reference.to_string(),
            reason: e.to_string(),
        })
    }

    async fn current_digest(&self, reference: &ImageReference) -> Result<String, RegistryError> {
        let url = self.manifest_url(reference);
        debug!(url = %url, "Resolving current digest");

        let resp = self
            .client
            .head(&url)
            .header(header::ACCEPT, MANIFEST_ACCEPT)
            .send()
            .await?;
        Self::check_status(resp.status(), reference)?;

        resp.headers()
            .get(DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| RegistryError::MissingDigest(reference.to_string()))
    }
}
