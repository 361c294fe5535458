//! SQLite-backed shared store.
//!
//! Several processes on one host can share a WAL-mode database file; every
//! operation is a single statement, so each field update is atomic.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::{SetMode, SharedStateStore};
use crate::Result;

/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;

/// Default connection pool size for file databases.
const DEFAULT_POOL_SIZE: u32 = 4;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS shared_state (
    bucket TEXT NOT NULL,
    field TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (bucket, field)
)
"#;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `database_url` and ensure
    /// the schema exists.
    ///
    /// # Arguments
    /// * `database_url` - SQLite URL, e.g. "sqlite:streams.db?mode=rwc" or "sqlite::memory:"
    pub async fn connect(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");

        let mut connect_options = SqliteConnectOptions::from_str(database_url)?
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
            .create_if_missing(true);
        if !in_memory {
            // Concurrent readers while another process writes.
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        // Each connection to ":memory:" is a separate database.
        let max_connections = if in_memory { 1 } else { DEFAULT_POOL_SIZE };

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30));
        if in_memory {
            // Closing the only connection would drop the database.
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options.connect_with(connect_options).await?;

        let store = Self::from_pool(pool).await?;
        info!(max_connections, in_memory, "shared state store initialized");
        Ok(store)
    }

    /// Use an existing pool, ensuring the schema exists.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SharedStateStore for SqliteStore {
    async fn hash_set(
        &self,
        bucket: &str,
        field: &str,
        value: &str,
        mode: SetMode,
    ) -> Result<bool> {
        let sql = match mode {
            SetMode::OnlyIfAbsent => {
                r#"
                INSERT OR IGNORE INTO shared_state (bucket, field, value, updated_at)
                VALUES (?, ?, ?, ?)
                "#
            }
            SetMode::AlwaysReplace => {
                r#"
                INSERT INTO shared_state (bucket, field, value, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (bucket, field)
                DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                "#
            }
        };

        let result = sqlx::query(sql)
            .bind(bucket)
            .bind(field)
            .bind(value)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn hash_delete(&self, bucket: &str, field: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM shared_state WHERE bucket = ? AND field = ?")
            .bind(bucket)
            .bind(field)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn hash_get_all(&self, bucket: &str) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT field, value FROM shared_state WHERE bucket = ?")
            .bind(bucket)
            .fetch_all(&self.pool)
            .await?;

        let fields = rows
            .into_iter()
            .map(|row| (row.get("field"), row.get("value")))
            .collect::<HashMap<String, String>>();
        debug!(bucket, fields = fields.len(), "loaded shared state");
        Ok(fields)
    }

    async fn key_delete(&self, bucket: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM shared_state WHERE bucket = ?")
            .bind(bucket)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
