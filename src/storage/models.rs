//! Row types for the storage layer

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// Latest digest published under a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Tag reference without its `:tag` suffix
    pub repository: String,
    /// Full tag reference, e.g. `repo/app:latest`
    pub tag: String,
    /// Bare content identifier, e.g. `sha256:...`
    pub digest: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Build-dependency edge from a derived image to its base tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub source_digest: String,
    pub base_ref: String,
    /// Digest the derived image was built against
    pub base_digest: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnedService {
    pub tag: String,
    pub created_at: String,
}

/// Dependency edge whose base tag moved away from the recorded digest,
/// joined with the derived image's tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleDependency {
    pub source_digest: String,
    pub base_ref: String,
    pub base_digest: String,
    /// Any tag currently pointing at the derived image
    pub image_tag: Option<String>,
    /// Tag pointing at the derived image that is registered as an owned service
    pub owned_tag: Option<String>,
}

impl<'r> FromRow<'r, SqliteRow> for Image {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            repository: row.try_get("repository")?,
            tag: row.try_get("tag")?,
            digest: row.try_get("digest")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for Dependency {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            source_digest: row.try_get("source_digest")?,
            base_ref: row.try_get("base_ref")?,
            base_digest: row.try_get("base_digest")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for OwnedService {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            tag: row.try_get("tag")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for StaleDependency {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            source_digest: row.try_get("source_digest")?,
            base_ref: row.try_get("base_ref")?,
            base_digest: row.try_get("base_digest")?,
            image_tag: row.try_get("image_tag")?,
            owned_tag: row.try_get("owned_tag")?,
        })
    }
}
