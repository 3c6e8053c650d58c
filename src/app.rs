//! Wiring between configuration, the record store and the file cache.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use hashbank_compare::{Comparator, Upload};
use hashbank_config::Config;
use hashbank_records::{ComparisonRecord, Database, Repository};
use hashbank_storage::CacheHandle;
use hashbank_storage::backend::LocalCache;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;

pub struct App {
    staging_dir: PathBuf,
    db: Database,
    records: Repository,
    comparator: Comparator,
}
impl App {
    pub async fn open(config: &Config) -> Result<Self> {
        let db = Database::connect_with(&config.database.path, config.database.max_connections)
            .await
            .or_raise(|| ErrorKind::Records)?;
        let public_root = std::path::absolute(&config.storage.public_root).or_raise(|| ErrorKind::Cache)?;
        let cache: CacheHandle =
            Arc::new(LocalCache::new("local", &public_root, &config.storage.cache_dir).or_raise(|| ErrorKind::Cache)?);
        let records = Repository::from(&db);
        tracing::debug!(
            database = %config.database.path.display(),
            public_root = %public_root.display(),
            "opened hashbank",
        );
        Ok(Self {
            staging_dir: config.storage.staging_dir.clone(),
            comparator: Comparator::new(records.clone(), cache),
            records,
            db,
        })
    }

    /// Copy both files into staging and compare the copies.
    ///
    /// Staged copies are removed once the comparison is over, whether it
    /// succeeded (they've been moved into the cache) or not.
    pub async fn compare(&self, file1: &Path, file2: &Path) -> Result<ComparisonRecord> {
        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .or_raise(|| ErrorKind::Stage(self.staging_dir.clone()))?;
        let (staged1, upload1) = self.stage(file1).await?;
        let (staged2, upload2) = self.stage(file2).await?;
        let record = self.comparator.compare(&upload1, &upload2).await.or_raise(|| ErrorKind::Compare);
        drop((staged1, staged2));
        record
    }

    async fn stage(&self, source: &Path) -> Result<(TempPath, Upload)> {
        let original_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| exn::Exn::from(ErrorKind::Stage(source.to_path_buf())))?;
        let staged = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(&self.staging_dir)
            .or_raise(|| ErrorKind::Stage(source.to_path_buf()))?
            .into_temp_path();
        tokio::fs::copy(source, &staged).await.or_raise(|| ErrorKind::Stage(source.to_path_buf()))?;
        let upload = Upload::new(staged.to_path_buf(), original_name);
        Ok((staged, upload))
    }

    pub async fn history(&self, limit: Option<usize>) -> Result<Vec<ComparisonRecord>> {
        match limit {
            Some(limit) => self.records.list_recent(limit).await.or_raise(|| ErrorKind::Records),
            None => self.comparator.history().await.or_raise(|| ErrorKind::Compare),
        }
    }

    pub async fn seed(&self) -> Result<Vec<ComparisonRecord>> {
        self.records.seed().await.or_raise(|| ErrorKind::Records)
    }

    pub async fn schema(&self) -> Result<Vec<String>> {
        let report = self.db.ensure_schema().await.or_raise(|| ErrorKind::Records)?;
        if !report.is_unchanged() {
            tracing::info!(created = report.created, added = ?report.added, "schema updated");
        }
        self.db.columns().await.or_raise(|| ErrorKind::Records)
    }

    pub async fn orphans(&self) -> Result<Vec<PathBuf>> {
        self.comparator.orphans().await.or_raise(|| ErrorKind::Compare)
    }

    pub async fn close(self) {
        self.db.close().await;
    }
}
