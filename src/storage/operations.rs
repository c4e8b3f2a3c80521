//! Image, dependency and ownership operations

use tracing::debug;

use super::database::Database;
use super::models::{Dependency, Image, OwnedService};

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Database {
    /// Insert or update the image row for `(repository, tag)`.
    pub async fn upsert_image(
        &self,
        repository: &str,
        tag: &str,
        digest: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO images (repository, tag, digest, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(repository, tag) DO UPDATE SET
                digest = excluded.digest,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(repository)
        .bind(tag)
        .bind(digest)
        .bind(now())
        .execute(&self.pool)
        .await?;

        debug!(repository = %repository, tag = %tag, digest = %digest, "Image upserted");
        Ok(())
    }

    /// Delete the image row for `(repository, tag)`. Returns whether a row existed.
    pub async fn delete_image(&self, repository: &str, tag: &str) -> Result<bool, sqlx::Error> {
        let affected = sqlx::query("DELETE FROM images WHERE repository = ?1 AND tag = ?2")
            .bind(repository)
            .bind(tag)
            .execute(&self.pool)
            .await?
            .rows_affected();

        debug!(
            repository = %repository,
            tag = %tag,
            deleted = affected > 0,
            "Image delete attempted"
        );
        Ok(affected > 0)
    }

    /// Current image row for a full tag reference.
    pub async fn get_image_by_tag(&self, tag: &str) -> Result<Option<Image>, sqlx::Error> {
        sqlx::query_as::<_, Image>(
            "SELECT repository, tag, digest, updated_at FROM images WHERE tag = ?1 LIMIT 1",
        )
        .bind(tag)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list_images(&self) -> Result<Vec<Image>, sqlx::Error> {
        sqlx::query_as::<_, Image>(
            "SELECT repository, tag, digest, updated_at FROM images ORDER BY repository, tag",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Record a dependency edge unless one already exists for its source digest.
    /// Returns whether the edge was inserted.
    pub async fn insert_dependency(
        &self,
        source_digest: &str,
        base_ref: &str,
        base_digest: &str,
    ) -> Result<bool, sqlx::Error> {
        let affected = sqlx::query(
            r#"
            INSERT INTO dependencies (source_digest, base_ref, base_digest, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(source_digest) DO NOTHING
            "#,
        )
        .bind(source_digest)
        .bind(base_ref)
        .bind(base_digest)
        .bind(now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        debug!(
            source_digest = %source_digest,
            base_ref = %base_ref,
            base_digest = %base_digest,
            inserted = affected > 0,
            "Dependency insert attempted"
        );
        Ok(affected > 0)
    }

    pub async fn get_dependency(
        &self,
        source_digest: &str,
    ) -> Result<Option<Dependency>, sqlx::Error> {
        sqlx::query_as::<_, Dependency>(
            "SELECT source_digest, base_ref, base_digest, created_at FROM dependencies WHERE source_digest = ?1",
        )
        .bind(source_digest)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list_dependencies(&self) -> Result<Vec<Dependency>, sqlx::Error> {
        sqlx::query_as::<_, Dependency>(
            "SELECT source_digest, base_ref, base_digest, created_at FROM dependencies ORDER BY base_ref, source_digest",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Register a tag as an owned service. Returns whether it was new.
    pub async fn add_owned_service(&self, tag: &str) -> Result<bool, sqlx::Error> {
        let affected = sqlx::query(
            "INSERT INTO owned_services (tag, created_at) VALUES (?1, ?2) ON CONFLICT(tag) DO NOTHING",
        )
        .bind(tag)
        .bind(now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        debug!(tag = %tag, inserted = affected > 0, "Owned service registration attempted");
        Ok(affected > 0)
    }

    pub async fn list_owned_services(&self) -> Result<Vec<OwnedService>, sqlx::Error> {
        sqlx::query_as::<_, OwnedService>(
            "SELECT tag, created_at FROM owned_services ORDER BY tag",
        )
        .fetch_all(&self.pool)
        .await
    }
}
