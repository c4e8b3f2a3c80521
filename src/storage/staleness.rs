//! Streaming stale-edge query

use futures::stream::BoxStream;

use super::database::Database;
use super::models::StaleDependency;

/// Edges on `base_ref` recorded against a digest other than the current one,
/// with the derived image's tags resolved through the image mirror.
const STALE_DEPENDENCIES: &str = r#"
    SELECT
        d.source_digest,
        d.base_ref,
        d.base_digest,
        (SELECT i.tag FROM images i
            WHERE i.digest = d.source_digest
            ORDER BY i.tag LIMIT 1) AS image_tag,
        (SELECT i.tag FROM images i
            JOIN owned_services o ON o.tag = i.tag
            WHERE i.digest = d.source_digest
            ORDER BY i.tag LIMIT 1) AS owned_tag
    FROM dependencies d
    WHERE d.base_ref = ?1 AND d.base_digest <> ?2
    ORDER BY d.source_digest
"#;

impl Database {
    /// Lazily stream the stale edges of a base tag.
    ///
    /// The stream holds a pooled connection until it is exhausted or dropped,
    /// so callers must drain it or let it go out of scope.
    pub fn stale_dependencies<'a>(
        &'a self,
        base_ref: &'a str,
        current_digest: &'a str,
    ) -> BoxStream<'a, Result<StaleDependency, sqlx::Error>> {
        sqlx::query_as::<_, StaleDependency>(STALE_DEPENDENCIES)
            .bind(base_ref)
            .bind(current_digest)
            .fetch(&self.pool)
    }
}
