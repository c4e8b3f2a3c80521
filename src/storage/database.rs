//! Connection pool and lifecycle management

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::{debug, info};

use super::schema::init_schema;

/// Connections for a file-backed database. SQLite serializes writers anyway.
const MAX_CONNECTIONS: u32 = 8;

/// SQLite database shared by all request tasks.
#[derive(Clone)]
pub struct Database {
    pub(super) pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `url` and initialize its schema.
    pub async fn connect(url: &str) -> Result<Self> {
        info!(url = %url, "Initializing database");

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let mut options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL: {}", url))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool_options = if in_memory {
            // Every connection to :memory: is a separate database; keep exactly one alive.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options = options.journal_mode(SqliteJournalMode::Wal);
            let filename = options.get_filename();
            if let Some(parent) = filename.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                info!(directory = %parent.display(), "Creating database directory");
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
            if filename.exists() {
                info!(path = %filename.display(), "Found existing database file");
            } else {
                info!(path = %filename.display(), "Creating new database file");
            }
            SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)
        };

        debug!(in_memory = in_memory, "Opening SQLite pool");
        let pool = pool_options
            .connect_with(options)
            .await
            .context("Failed to open SQLite database")?;

        let sqlite_version: String = sqlx::query_scalar("SELECT sqlite_version()")
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|_| "unknown".to_string());

        init_schema(&pool).await?;

        let db = Self { pool };
        let images = db.count_images().await.unwrap_or(0);
        let dependencies = db.count_dependencies().await.unwrap_or(0);

        info!(
            images = images,
            dependencies = dependencies,
            sqlite_version = %sqlite_version,
            "Database initialized successfully"
        );

        Ok(db)
    }

    /// In-memory database, mainly for tests.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// Close every pooled connection. Subsequent operations fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn count_images(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM images")
            .fetch_one(&self.pool)
            .await
    }

    async fn count_dependencies(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM dependencies")
            .fetch_one(&self.pool)
            .await
    }
}
