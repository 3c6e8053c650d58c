//! In-memory cache backend for testing.

use crate::error::{ErrorKind, Result};
use crate::name::{Stamper, cache_file_name, sanitize};
use crate::path::validate as validate_path;
use crate::{CacheBackend, Slot};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// In-memory cache backend for testing.
///
/// Placing a file reads the staged file into memory and deletes it from
/// disk, so callers see the same ownership transfer as with
/// [`LocalCache`](super::LocalCache). Individual slots can be made to fail
/// to exercise rollback paths.
///
/// # Examples
///
/// ```
/// use hashbank_storage::backend::MockCache;
/// use hashbank_storage::{CacheBackend, Slot};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dir = tempfile::tempdir()?;
/// let staged = dir.path().join("upload");
/// std::fs::write(&staged, b"hello")?;
///
/// let cache = MockCache::default();
/// let stored = cache.place(&staged, "hello.txt", Slot::First).await.unwrap();
/// assert!(!staged.exists());
/// assert_eq!(cache.contents(&stored).await, Some(b"hello".to_vec()));
/// # Ok(())
/// # }
/// ```
pub struct MockCache {
    name: String,
    cache_dir: PathBuf,
    stamper: Stamper,
    files: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
    failing: HashSet<Slot>,
}

impl MockCache {
    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make every placement into `slot` fail with
    /// [`PermissionDenied`](ErrorKind::PermissionDenied), leaving the staged
    /// file untouched.
    pub fn failing(mut self, slot: Slot) -> Self {
        self.failing.insert(slot);
        self
    }

    /// Contents of a stored file, if there is one.
    pub async fn contents(&self, stored: &Path) -> Option<Vec<u8>> {
        let stored = validate_path(stored).ok()?;
        self.files.read().await.get(&stored).cloned()
    }
}
impl Default for MockCache {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            cache_dir: PathBuf::from("cache"),
            stamper: Stamper::default(),
            files: RwLock::new(BTreeMap::new()),
            failing: HashSet::new(),
        }
    }
}

fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
    match e.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
        std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
        _ => ErrorKind::Io(e),
    }
}

#[async_trait]
impl CacheBackend for MockCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn place(&self, staged: &Path, original_name: &str, slot: Slot) -> Result<PathBuf> {
        let sanitized = sanitize(original_name)?;
        if self.failing.contains(&slot) {
            exn::bail!(ErrorKind::PermissionDenied(staged.to_path_buf()));
        }
        let data = tokio::fs::read(staged).await.map_err(|e| map_io_error(e, staged))?;
        let stored = self.cache_dir.join(cache_file_name(self.stamper.next(), slot, &sanitized));
        tokio::fs::remove_file(staged).await.map_err(|e| map_io_error(e, staged))?;
        self.files.write().await.insert(stored.clone(), data);
        Ok(stored)
    }

    async fn restore(&self, stored: &Path, staged: &Path) -> Result<()> {
        let stored = validate_path(stored)?;
        let data = self.files.write().await.remove(&stored).ok_or_else(|| ErrorKind::NotFound(stored.clone()))?;
        tokio::fs::write(staged, data).await.map_err(|e| map_io_error(e, staged))?;
        Ok(())
    }

    async fn exists(&self, stored: &Path) -> Result<bool> {
        let stored = validate_path(stored)?;
        Ok(self.files.read().await.contains_key(&stored))
    }

    fn resolve(&self, stored: &Path) -> Result<PathBuf> {
        validate_path(stored)
    }

    async fn delete(&self, stored: &Path) -> Result<()> {
        let stored = validate_path(stored)?;
        match self.files.write().await.remove(&stored) {
            Some(_) => Ok(()),
            None => exn::bail!(ErrorKind::NotFound(stored)),
        }
    }

    async fn list(&self) -> Result<Vec<PathBuf>> {
        Ok(self.files.read().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failing_slot_leaves_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("upload");
        std::fs::write(&staged, b"data").unwrap();
        let cache = MockCache::default().failing(Slot::Second);
        let err = cache.place(&staged, "x.bin", Slot::Second).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));
        assert!(staged.exists());
        // The other slot still works.
        cache.place(&staged, "x.bin", Slot::First).await.unwrap();
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn test_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("upload");
        std::fs::write(&staged, b"data").unwrap();
        let cache = MockCache::default();
        let stored = cache.place(&staged, "x.bin", Slot::First).await.unwrap();
        cache.restore(&stored, &staged).await.unwrap();
        assert_eq!(std::fs::read(&staged).unwrap(), b"data");
        assert!(cache.list().await.unwrap().is_empty());
    }
}
