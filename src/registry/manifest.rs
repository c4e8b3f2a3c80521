use std::collections::HashMap;

use serde::Deserialize;

pub const ANNOTATION_BASE_DIGEST: &str = "org.opencontainers.image.base.digest";
pub const ANNOTATION_BASE_NAME: &str = "org.opencontainers.image.base.name";

/// The parts of an image manifest or index the watcher reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

/// Base image recorded in a manifest's annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseImage {
    pub name: String,
    pub digest: String,
}

impl Manifest {
    pub fn with_annotations<I, K, V>(annotations: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            annotations: annotations
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// Base image, present only when both the name and digest annotations are set.
    pub fn base_image(&self) -> Option<BaseImage> {
        let digest = self.annotations.get(ANNOTATION_BASE_DIGEST)?;
        let name = self.annotations.get(ANNOTATION_BASE_NAME)?;
        if digest.is_empty() || name.is_empty() {
            return None;
        }
        Some(BaseImage {
            name: name.clone(),
            digest: digest.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_image_present() {
        let manifest = Manifest::with_annotations([
            (ANNOTATION_BASE_DIGEST, "sha256:d0"),
            (ANNOTATION_BASE_NAME, "repo/base:latest"),
        ]);
        assert_eq!(
            manifest.base_image(),
            Some(BaseImage {
                name: "repo/base:latest".to_string(),
                digest: "sha256:d0".to_string(),
            })
        );
    }

    #[test]
    fn test_base_image_requires_both_annotations() {
        let only_digest = Manifest::with_annotations([(ANNOTATION_BASE_DIGEST, "sha256:d0")]);
        assert_eq!(only_digest.base_image(), None);

        let only_name = Manifest::with_annotations([(ANNOTATION_BASE_NAME, "repo/base:latest")]);
        assert_eq!(only_name.base_image(), None);

        assert_eq!(Manifest::default().base_image(), None);
    }

    #[test]
    fn test_deserialize_oci_manifest() {
        let raw = r#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "config": {"mediaType": "application/vnd.oci.image.config.v1+json", "size": 10, "digest": "sha256:c"},
            "layers": [],
            "annotations": {
                "org.opencontainers.image.base.digest": "sha256:d0",
                "org.opencontainers.image.base.name": "docker.io/library/node:20"
            }
        }"#;
        let manifest: Manifest = serde_json::from_str(raw).unwrap();
        assert_eq!(manifest.schema_version, Some(2));
        let base = manifest.base_image().unwrap();
        assert_eq!(base.name, "docker.io/library/node:20");
        assert_eq!(base.digest, "sha256:d0");
    }

    #[test]
    fn test_deserialize_manifest_without_annotations() {
        let raw = r#"{"schemaVersion": 2, "mediaType": "application/vnd.docker.distribution.manifest.v2+json"}"#;
        let manifest: Manifest = serde_json::from_str(raw).unwrap();
        assert!(manifest.annotations.is_empty());
        assert_eq!(manifest.base_image(), None);
    }
}
