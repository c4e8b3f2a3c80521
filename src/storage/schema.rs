//! Database schema initialization

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{debug, info};

const SCHEMA: &[&str] = &[
    // Registry mirror: latest digest per tag
    r#"
    CREATE TABLE IF NOT EXISTS images (
        repository TEXT NOT NULL,
        tag TEXT NOT NULL,
        digest TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (repository, tag)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_images_digest ON images(digest)",
    "CREATE INDEX IF NOT EXISTS idx_images_tag ON images(tag)",
    // One base edge per derived image digest
    r#"
    CREATE TABLE IF NOT EXISTS dependencies (
        source_digest TEXT PRIMARY KEY NOT NULL,
        base_ref TEXT NOT NULL,
        base_digest TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_dependencies_base_ref ON dependencies(base_ref)",
    r#"
    CREATE TABLE IF NOT EXISTS owned_services (
        tag TEXT PRIMARY KEY NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
];

/// Initialize the database schema
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    debug!("Initializing database schema");

    let table_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='dependencies'",
    )
    .fetch_one(pool)
    .await
    .unwrap_or(0);

    if table_count > 0 {
        debug!("Dependencies table already exists, checking schema");
    } else {
        info!("Creating new database schema");
    }

    for statement in SCHEMA {
        sqlx::query(*statement)
            .execute(pool)
            .await
            .context("Failed to initialize database schema")?;
    }

    let index_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'",
    )
    .fetch_one(pool)
    .await
    .unwrap_or(0);

    debug!(
        tables = "images,dependencies,owned_services",
        indexes = index_count,
        "Database schema initialized"
    );

    Ok(())
}
