//! Container image reference parsing.
//!
//! Parses references like `us-docker.pkg.dev/proj/repo/app:latest` or
//! `ghcr.io/org/app@sha256:abc...` into their components.

use std::fmt;

use crate::registry::RegistryError;

/// Registry used when a reference names none.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Tag used when a reference carries neither tag nor digest.
const DEFAULT_TAG: &str = "latest";

/// Parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry host, optionally with port (e.g. "ghcr.io", "localhost:5000")
    pub registry: String,
    /// Repository path inside the registry (e.g. "library/node", "proj/repo/app")
    pub repository: String,
    pub tag: Option<String>,
    /// Content digest (e.g. "sha256:abc...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// Supports formats:
    /// - `node` -> docker.io/library/node:latest
    /// - `node:20` -> docker.io/library/node:20
    /// - `ghcr.io/org/app:tag`
    /// - `ghcr.io/org/app@sha256:abc...`
    /// - `localhost:5000/app:tag@sha256:abc...`
    pub fn parse(reference: &str) -> Result<Self, RegistryError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(RegistryError::InvalidReference(
                "empty image reference".to_string(),
            ));
        }

        let (name_tag, digest) = match reference.rsplit_once('@') {
            Some((name, digest)) => {
                let valid = digest
                    .split_once(':')
                    .is_some_and(|(algo, hex)| !algo.is_empty() && !hex.is_empty());
                if !valid {
                    return Err(RegistryError::InvalidReference(format!(
                        "invalid digest in '{}': expected algorithm:hex",
                        reference
                    )));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        let (name, tag) = split_tag(name_tag);
        if name.is_empty() {
            return Err(RegistryError::InvalidReference(format!(
                "missing repository in '{}'",
                reference
            )));
        }
        if let Some(t) = tag
            && t.is_empty()
        {
            return Err(RegistryError::InvalidReference(format!(
                "empty tag in '{}'",
                reference
            )));
        }

        let (registry, repository) = split_registry(name)?;

        let tag = match (tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            (tag, _) => tag.map(str::to_string),
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// The manifest reference used against the registry API: the digest when
    /// pinned, otherwise the tag.
    pub fn manifest_reference(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }

    /// The content identifier, if the reference is digest-pinned.
    pub fn identifier(&self) -> Option<&str> {
        self.digest.as_deref()
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

/// Split `name[:tag]`, where the tag colon must come after the last slash
/// so that registry ports (`localhost:5000/app`) stay in the name.
fn split_tag(name_tag: &str) -> (&str, Option<&str>) {
    let tail_start = name_tag.rfind('/').map_or(0, |pos| pos + 1);
    match name_tag[tail_start..].rfind(':') {
        Some(colon) => {
            let colon = tail_start + colon;
            (&name_tag[..colon], Some(&name_tag[colon + 1..]))
        }
        None => (name_tag, None),
    }
}

fn split_registry(name: &str) -> Result<(String, String), RegistryError> {
    if let Some((first, rest)) = name.split_once('/')
        && (first.contains('.') || first.contains(':') || first == "localhost")
    {
        if rest.is_empty() {
            return Err(RegistryError::InvalidReference(format!(
                "empty repository in '{}'",
                name
            )));
        }
        return Ok((first.to_string(), rest.to_string()));
    }

    let repository = if name.contains('/') {
        name.to_string()
    } else {
        format!("library/{}", name)
    };
    Ok((DEFAULT_REGISTRY.to_string(), repository))
}

/// Repository part of a tag reference exactly as written
/// (`repo/app:latest` -> `repo/app`). Digest suffixes are dropped too.
pub fn repository_of(reference: &str) -> &str {
    let name_tag = reference
        .rsplit_once('@')
        .map_or(reference, |(name, _)| name);
    split_tag(name_tag).0
}

/// Bare content identifier of a digest reference
/// (`repo/app@sha256:abc` -> `sha256:abc`, `sha256:abc` -> `sha256:abc`).
pub fn digest_identifier(reference: &str) -> &str {
    reference
        .rsplit_once('@')
        .map_or(reference, |(_, digest)| digest)
}
