//! Repository for comparison records.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{ComparisonRecord, ComparisonRow, NewComparison, NewComparisonRow};
use exn::ResultExt;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::instrument;

/// Repository for reading and writing rows of the `comparisons` table.
///
/// Cheap to clone; every clone shares the same connection pool. Rows are
/// only ever appended: there is no update, and the only removal is
/// [`reset()`](Self::reset).
#[derive(Debug, Clone)]
pub struct Repository {
    pub(crate) pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Record a comparison.
    ///
    /// A single `INSERT ... RETURNING` statement, so the returned record
    /// carries the id and timestamp the database assigned and concurrent
    /// callers never see each other's rows half-written.
    #[instrument("recording comparison", skip_all, fields(matched = new.is_match()))]
    pub async fn insert(&self, new: &NewComparison) -> Result<ComparisonRecord> {
        let row = NewComparisonRow::try_from(new)?;
        let inserted: ComparisonRow = sqlx::query_as(include_str!("../queries/insert_comparison.sql"))
            .bind(row.file1_hash)
            .bind(row.file2_hash)
            .bind(row.file1_path)
            .bind(row.file2_path)
            .bind(row.matched)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let record = ComparisonRecord::try_from(inserted)?;
        tracing::info!(id = record.id, matched = record.matched, "comparison recorded");
        Ok(record)
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    /// Get a single comparison by its id.
    pub async fn get(&self, id: i64) -> Result<Option<ComparisonRecord>> {
        let row: Option<ComparisonRow> = sqlx::query_as(include_str!("../queries/get_by_id.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(|r| r.try_into()).transpose()
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// Every comparison ever recorded, newest first.
    ///
    /// Rows created within the same millisecond (or carrying identical
    /// second-resolution timestamps from older databases) are ordered by id,
    /// highest first.
    pub async fn list_all(&self) -> Result<Vec<ComparisonRecord>> {
        let rows: Vec<ComparisonRow> = sqlx::query_as(include_str!("../queries/list_all.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// The `limit` most recent comparisons, in the same order as
    /// [`list_all()`](Self::list_all).
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<ComparisonRecord>> {
        let limit = i64::try_from(limit).or_raise(|| ErrorKind::InvalidData("limit"))?;
        let rows: Vec<ComparisonRow> = sqlx::query_as(include_str!("../queries/list_recent.sql"))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// Every cached file path that at least one record points at.
    pub async fn referenced_paths(&self) -> Result<HashSet<PathBuf>> {
        let paths: Vec<String> = sqlx::query_scalar(include_str!("../queries/list_referenced_paths.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(paths.into_iter().map(PathBuf::from).collect())
    }

    // =========================================================================
    // Counts
    // =========================================================================

    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("row count"))
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete every comparison, returning how many there were.
    ///
    /// Ids keep counting up from where they were; they are never reused.
    #[instrument("resetting comparisons", skip_all)]
    pub async fn reset(&self) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/delete_all.sql"))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::info!(deleted = result.rows_affected(), "comparisons reset");
        Ok(result.rows_affected())
    }
}
