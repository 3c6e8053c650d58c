//! Database connection and pool management.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;

use crate::error::{ErrorKind, Result};
use crate::schema::{self, SchemaReport};

/// Comparisons arrive one request at a time; a handful of connections is
/// plenty for readers while SQLite serialises the writers.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Database connection pool for the record store.
///
/// This is the main entry point for the record store: open it once at
/// startup, hand [`Repository`](crate::Repository) handles to whoever needs
/// them, and [`close()`](Self::close) it at shutdown.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn new(options: SqliteConnectOptions, max: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Applies the query-based PRAGMAs to EVERY connection in the
            // pool, not only the first one handed out.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        let report = db.ensure_schema().await?;
        tracing::debug!(created = report.created, added = ?report.added, "record store ready");
        Ok(db)
    }

    /// Connect to the record store at the given path.
    ///
    /// Creates the parent directory and the database file if they don't
    /// exist, then brings the schema up to date.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with(path, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Same as [`connect()`](Self::connect), with an explicit pool size.
    pub async fn connect_with(path: impl AsRef<Path>, max_connections: u32) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Database)?;
        }
        let options = Self::base_options().filename(path).create_if_missing(true);
        Self::new(options, max_connections.max(1)).await
    }

    /// Connect to an in-memory database (useful for testing).
    ///
    /// Note:
    /// - In-memory databases are destroyed when the connection closes.
    /// - Do NOT apply `#[cfg(test)]` so that other crates can also use this in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        // Every extra connection to ":memory:" would be a brand new, empty
        // database. One connection keeps everyone looking at the same data.
        Self::new(options, 1).await
    }

    /// Base connection options shared between file and in-memory databases.
    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            // Readers don't block the writer and vice versa.
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // Concurrent comparisons queue up on SQLite's single writer lock
            // instead of failing straight away with SQLITE_BUSY.
            .busy_timeout(Duration::from_secs(5))
    }

    /// Apply additional PRAGMA settings that aren't exposed via SqliteConnectOptions.
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA locking_mode = NORMAL;
                PRAGMA wal_autocheckpoint = 1000;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Bring the `comparisons` table up to date.
    ///
    /// Called automatically by [`connect()`](Self::connect) and
    /// [`connect_in_memory()`](Self::connect_in_memory); calling it again is
    /// harmless and reports no changes.
    pub async fn ensure_schema(&self) -> Result<SchemaReport> {
        schema::ensure(&self.pool).await
    }

    /// Names of the columns the `comparisons` table currently has, in table
    /// order.
    pub async fn columns(&self) -> Result<Vec<String>> {
        schema::columns(&self.pool).await
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    ///
    /// Waits for all connections to be returned to the pool and then closes
    /// them. After calling this, the Database instance should not be used.
    pub async fn close(&self) {
        // Let SQLite update query planner statistics
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.pool().is_closed());
        db.close().await;
        assert!(db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_connect_creates_parent_directory() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("db/hashbank.db");
        let db = Database::connect(&path).await.unwrap();
        assert!(path.exists());
        db.close().await;
    }

    #[tokio::test]
    async fn test_pragmas_are_applied() {
        let temp = tempfile::tempdir().unwrap();
        let db = Database::connect(temp.path().join("hashbank.db")).await.unwrap();
        // Set by SqliteConnectOptions.
        let row: (String,) = sqlx::query_as("PRAGMA journal_mode").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, "wal");
        // Set by after_connect().
        let row: (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 1000);
        db.close().await;
    }
}
