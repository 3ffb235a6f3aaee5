use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::DatabaseError;

// ============================================================================
// Database
// ============================================================================

#[derive(Debug, Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database (used by tests). The
    /// pool is pinned to a single connection that never idles out, otherwise
    /// the database would vanish with the last connection.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let in_memory = path == ":memory:";
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: wait up to 5 seconds for a lock before SQLITE_BUSY.
        // Concurrent checks finishing in the same tick contend on the writer.
        let options = SqliteConnectOptions::from_str(&url)?.pragma("busy_timeout", "5000");

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate()
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        tracing::debug!(path = %path, "Database opened");
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id INTEGER PRIMARY KEY,
                url TEXT NOT NULL,
                target TEXT NOT NULL,
                interval_ms INTEGER NOT NULL DEFAULT 60000,
                last_seen_link TEXT NOT NULL DEFAULT '',
                last_seen_timestamp INTEGER,
                active INTEGER NOT NULL DEFAULT 1,
                title TEXT,
                created_at INTEGER NOT NULL,
                UNIQUE(url, target)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_subscriptions_target ON subscriptions(target)",
        )
        .execute(&mut *tx)
        .await?;

        // Partial index for the scheduler's per-tick scan
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_subscriptions_active ON subscriptions(id) WHERE active = 1",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
