use crate::Upload;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use hashbank_digest::digest_file;
use hashbank_records::{ComparisonRecord, NewComparison, Repository};
use hashbank_storage::{CacheBackend, CacheHandle, Slot};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Digests, places and records pairs of uploads.
///
/// Holds handles rather than owning anything: clone freely, one per request
/// if that's convenient.
#[derive(Clone)]
pub struct Comparator {
    records: Repository,
    cache: CacheHandle,
}
impl Comparator {
    pub fn new(records: Repository, cache: CacheHandle) -> Self {
        Self { records, cache }
    }

    /// Compare two uploads and record the result.
    ///
    /// 1. Both files are digested concurrently. If either can't be read,
    ///    fails with [`Read`](ErrorKind::Read) before anything is moved.
    /// 2. Both files are moved into the cache concurrently. If either move
    ///    fails, the other (if it went through) is moved back to its staging
    ///    path and this fails with [`Placement`](ErrorKind::Placement).
    /// 3. The comparison is inserted. On [`Store`](ErrorKind::Store) failure
    ///    the cached files stay put; see [`orphans()`](Self::orphans).
    ///
    /// The returned record is exactly what was persisted.
    #[instrument("comparing uploads", skip_all, fields(file1 = %first.original_name, file2 = %second.original_name))]
    pub async fn compare(&self, first: &Upload, second: &Upload) -> Result<ComparisonRecord> {
        let (file1_digest, file2_digest) =
            tokio::try_join!(digest_file(&first.staged), digest_file(&second.staged)).or_raise(|| ErrorKind::Read)?;
        tracing::debug!(%file1_digest, %file2_digest, "uploads digested");

        let (file1_path, file2_path) = self.place_both(first, second).await?;

        let new = NewComparison::new(file1_digest, file2_digest).with_paths(&file1_path, &file2_path);
        match self.records.insert(&new).await {
            Ok(record) => Ok(record),
            Err(e) => {
                tracing::warn!(
                    file1 = %file1_path.display(),
                    file2 = %file2_path.display(),
                    "comparison not recorded; cached files are now orphans",
                );
                Err(e).or_raise(|| ErrorKind::Store)
            },
        }
    }

    /// Move both uploads into the cache, or neither.
    async fn place_both(&self, first: &Upload, second: &Upload) -> Result<(PathBuf, PathBuf)> {
        let (placed1, placed2) = tokio::join!(
            self.cache.place(&first.staged, &first.original_name, Slot::First),
            self.cache.place(&second.staged, &second.original_name, Slot::Second),
        );
        match (placed1, placed2) {
            (Ok(file1), Ok(file2)) => Ok((file1, file2)),
            (Ok(file1), Err(e)) => {
                self.roll_back(&file1, first).await;
                Err(e).or_raise(|| ErrorKind::Placement)
            },
            (Err(e), Ok(file2)) => {
                self.roll_back(&file2, second).await;
                Err(e).or_raise(|| ErrorKind::Placement)
            },
            (Err(e), Err(other)) => {
                tracing::debug!(error = %other, "second upload could not be placed either");
                Err(e).or_raise(|| ErrorKind::Placement)
            },
        }
    }

    /// Best effort: the comparison is failing regardless of how this goes.
    async fn roll_back(&self, stored: &Path, upload: &Upload) {
        match self.cache.restore(stored, &upload.staged).await {
            Ok(()) => tracing::debug!(stored = %stored.display(), "placement rolled back"),
            Err(e) => tracing::warn!(
                stored = %stored.display(),
                staged = %upload.staged.display(),
                error = %e,
                "could not roll back placement; file left in cache",
            ),
        }
    }

    /// Every recorded comparison, newest first.
    pub async fn history(&self) -> Result<Vec<ComparisonRecord>> {
        self.records.list_all().await.or_raise(|| ErrorKind::Store)
    }

    /// Cached files that no record points at.
    ///
    /// These are left behind when recording a comparison fails after its
    /// files were placed, or when records are reset. Nothing is deleted here.
    #[instrument("finding orphaned cache files", skip_all, fields(cache = self.cache.name()))]
    pub async fn orphans(&self) -> Result<Vec<PathBuf>> {
        let referenced = self.records.referenced_paths().await.or_raise(|| ErrorKind::Store)?;
        let cached = self.cache.list().await.or_raise(|| ErrorKind::Placement)?;
        let orphans: Vec<PathBuf> = cached.into_iter().filter(|path| !referenced.contains(path)).collect();
        if !orphans.is_empty() {
            tracing::warn!(count = orphans.len(), "cache holds files without a record");
        }
        Ok(orphans)
    }
}
