//! Demo data for a fresh vault.

use crate::error::{ErrorKind, Result};
use crate::models::{ComparisonRecord, ComparisonRow, NewComparison, NewComparisonRow};
use crate::repo::Repository;
use exn::ResultExt;
use hashbank_digest::digest;
use tracing::instrument;

/// One matching pair and the two mismatching orders of the same contents.
fn fixtures() -> [NewComparison; 3] {
    let (ones, zeros) = (digest(b"111111"), digest(b"000000"));
    [
        NewComparison::new(ones.clone(), ones.clone()),
        NewComparison::new(ones.clone(), zeros.clone()),
        NewComparison::new(zeros, ones),
    ]
}

impl Repository {
    /// Replace every comparison with a small set of fixture rows.
    ///
    /// Runs in a single transaction: either the table ends up holding exactly
    /// the fixtures or it's left untouched.
    #[instrument("seeding comparisons", skip_all)]
    pub async fn seed(&self) -> Result<Vec<ComparisonRecord>> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let deleted = sqlx::query(include_str!("../queries/delete_all.sql"))
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?
            .rows_affected();
        let mut rows = Vec::new();
        for new in &fixtures() {
            let row = NewComparisonRow::try_from(new)?;
            let inserted: ComparisonRow = sqlx::query_as(include_str!("../queries/insert_comparison.sql"))
                .bind(row.file1_hash)
                .bind(row.file2_hash)
                .bind(row.file1_path)
                .bind(row.file2_path)
                .bind(row.matched)
                .fetch_one(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            rows.push(inserted);
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::info!(deleted, inserted = rows.len(), "vault seeded");
        rows.into_iter().map(|r| r.try_into()).collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, NewComparison, Repository};
    use hashbank_digest::digest;

    #[tokio::test]
    async fn test_seed_replaces_existing_rows() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        for _ in 0..5 {
            repo.insert(&NewComparison::new(digest(b"x"), digest(b"y"))).await.unwrap();
        }
        let seeded = repo.seed().await.unwrap();
        assert_eq!(seeded.len(), 3);
        assert_eq!(repo.count().await.unwrap(), 3);
        let matches: Vec<bool> = seeded.iter().map(|r| r.matched).collect();
        assert_eq!(matches, [true, false, false]);
        assert_eq!(seeded[1].file1_digest, seeded[2].file2_digest);
        assert!(seeded.iter().all(|r| r.file1_path.is_none()));
    }

    #[tokio::test]
    async fn test_seed_is_repeatable() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        repo.seed().await.unwrap();
        repo.seed().await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 3);
    }
}
