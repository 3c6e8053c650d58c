//! Local filesystem cache backend.
//!
//! Placed files live in `<public root>/<cache dir>/`. A placement hard-links
//! the staged upload under its new name and then unlinks the staged name.
//! `link(2)` refuses to replace an existing file, so a cache name can't be
//! handed out twice even when several caches share one directory.

use crate::error::{ErrorKind, Result};
use crate::name::{Stamper, cache_file_name, sanitize};
use crate::path::validate as validate_path;
use crate::{CacheBackend, Slot};
use async_trait::async_trait;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use tokio::fs;

/// How many fresh stamps to try before deciding the cache directory is being
/// hammered by something else. Each retry skips twice as far ahead as the
/// last, so this covers a run of about a minute of taken stamps.
const MAX_NAME_ATTEMPTS: u32 = 16;

/// Local filesystem cache backend.
///
/// # Examples
///
/// ```no_run
/// use hashbank_storage::backend::LocalCache;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// // Files end up in /srv/hashbank/public/cache/ and are recorded as "cache/...".
/// let cache = LocalCache::new("local", "/srv/hashbank/public", "cache")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LocalCache {
    name: String,
    /// Directory that stored paths are relative to (the publicly served one).
    root: PathBuf,
    /// Sub-directory of `root` that placed files go in.
    cache_dir: PathBuf,
    stamper: Stamper,
}
impl LocalCache {
    /// Create a new local cache backend.
    ///
    /// # Arguments
    /// * `root` - Absolute path to the public root directory
    /// * `cache_dir` - Directory, relative to `root`, that files get placed in
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not absolute or is not a directory, or
    /// if `cache_dir` would escape `root`.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>, cache_dir: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if cache_dir.as_ref().is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(cache_dir.as_ref().to_path_buf()));
        }
        let cache_dir = validate_path(cache_dir)?;
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Use non-async here; it'll only happen once at startup and it's
            // not worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self {
            name: name.into(),
            root,
            cache_dir,
            stamper: Stamper::default(),
        })
    }

    /// Get the absolute path for a stored path.
    fn absolute_path(&self, stored: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(stored.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::CrossesDevices => ErrorKind::CrossDevice(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Errors from linking a staged file into the cache. A missing file is
    /// the upload's fault; anything about permissions or devices is the
    /// cache directory's.
    fn map_link_error(e: std::io::Error, staged: &Path, destination: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(staged.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(destination.to_path_buf()),
            std::io::ErrorKind::CrossesDevices => ErrorKind::CrossDevice(destination.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Link the staged file into the cache under a name nobody else holds.
    ///
    /// Claiming the name and creating the file are the same system call, so
    /// there's no window between checking a name is free and taking it.
    async fn link_fresh_name(&self, staged: &Path, sanitized: &str, slot: Slot) -> Result<PathBuf> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let stamp = self.stamper.next();
            let stored = self.cache_dir.join(cache_file_name(stamp, slot, sanitized));
            let destination = self.root.join(&stored);
            match fs::hard_link(staged, &destination).await {
                Ok(()) => return Ok(stored),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    tracing::debug!(path = %stored.display(), attempt, "cache name taken; skipping ahead");
                    self.stamper.skip_past(stamp + (1i64 << attempt));
                },
                Err(e) => exn::bail!(Self::map_link_error(e, staged, &destination)),
            }
        }
        exn::bail!(ErrorKind::AlreadyExists(self.cache_dir.join(sanitized)))
    }
}

#[async_trait]
impl CacheBackend for LocalCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn place(&self, staged: &Path, original_name: &str, slot: Slot) -> Result<PathBuf> {
        let sanitized = sanitize(original_name)?;
        let directory = self.root.join(&self.cache_dir);
        // Idempotent: an existing directory is fine.
        fs::create_dir_all(&directory).await.map_err(|e| Self::map_io_error(e, &directory))?;
        let stored = self.link_fresh_name(staged, &sanitized, slot).await?;
        if let Err(e) = fs::remove_file(staged).await {
            // Both names point at the upload now; drop the new one so the
            // upload is left staged, exactly as before.
            let destination = self.root.join(&stored);
            if let Err(unlink) = fs::remove_file(&destination).await {
                tracing::warn!(path = %destination.display(), error = %unlink, "could not undo half-finished placement");
            }
            exn::bail!(Self::map_io_error(e, staged));
        }
        tracing::debug!(backend = %self.name, %slot, from = %staged.display(), to = %stored.display(), "placed upload");
        Ok(stored)
    }

    async fn restore(&self, stored: &Path, staged: &Path) -> Result<()> {
        let absolute = self.absolute_path(stored)?;
        if let Some(parent) = staged.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, parent))?;
        }
        fs::rename(&absolute, staged).await.map_err(|e| Self::map_io_error(e, stored))?;
        Ok(())
    }

    async fn exists(&self, stored: &Path) -> Result<bool> {
        let absolute = self.absolute_path(stored)?;
        Ok(fs::try_exists(&absolute).await.map_err(ErrorKind::Io)?)
    }

    fn resolve(&self, stored: &Path) -> Result<PathBuf> {
        self.absolute_path(stored)
    }

    async fn delete(&self, stored: &Path) -> Result<()> {
        let absolute = self.absolute_path(stored)?;
        Ok(fs::remove_file(&absolute).await.map_err(|e| Self::map_io_error(e, stored))?)
    }

    async fn list(&self) -> Result<Vec<PathBuf>> {
        let directory = self.root.join(&self.cache_dir);
        let mut entries = match fs::read_dir(&directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => exn::bail!(Self::map_io_error(e, &directory)),
        };
        let mut stored = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Self::map_io_error(e, &directory))? {
            let file_type = entry.file_type().await.map_err(ErrorKind::Io)?;
            // Only files are placed; anything else was put there by hand.
            if file_type.is_file() {
                let path = self.cache_dir.join(entry.file_name());
                stored.push(validate_path(&path)?);
            }
        }
        stored.sort();
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(temp: &tempfile::TempDir) -> LocalCache {
        LocalCache::new("local", temp.path().join("public"), "cache").unwrap()
    }

    fn stage(temp: &tempfile::TempDir, name: &str, data: &[u8]) -> PathBuf {
        let uploads = temp.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        let staged = uploads.join(name);
        std::fs::write(&staged, data).unwrap();
        staged
    }

    #[test]
    fn test_new_requires_absolute_root() {
        let temp = tempfile::tempdir().unwrap();
        assert!(LocalCache::new("local", temp.path(), "cache").is_ok());
        assert!(LocalCache::new("local", "relative/public", "cache").is_err());
    }

    #[test]
    fn test_new_rejects_escaping_cache_dir() {
        let temp = tempfile::tempdir().unwrap();
        assert!(LocalCache::new("local", temp.path(), "../elsewhere").is_err());
        assert!(LocalCache::new("local", temp.path(), "/abs/cache").is_err());
    }

    #[test]
    fn test_new_creates_root() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("not/yet/here");
        LocalCache::new("local", &root, "cache").unwrap();
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_place_moves_file() {
        let temp = tempfile::tempdir().unwrap();
        let cache = cache(&temp);
        let staged = stage(&temp, "a1b2c3", b"hello");
        let stored = cache.place(&staged, "cat.png", Slot::First).await.unwrap();

        assert!(!staged.exists(), "staged file should be gone");
        assert!(stored.starts_with("cache"));
        let name = stored.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("_1_cat.png"), "{name}");
        assert_eq!(std::fs::read(cache.resolve(&stored).unwrap()).unwrap(), b"hello");
        assert!(cache.exists(&stored).await.unwrap());
    }

    #[tokio::test]
    async fn test_place_creates_cache_dir_once() {
        let temp = tempfile::tempdir().unwrap();
        let cache = cache(&temp);
        let first = stage(&temp, "one", b"1");
        let second = stage(&temp, "two", b"2");
        // The second call finds the directory already there.
        cache.place(&first, "x.txt", Slot::First).await.unwrap();
        cache.place(&second, "x.txt", Slot::Second).await.unwrap();
        assert_eq!(cache.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_same_name_same_slot_never_collides() {
        let temp = tempfile::tempdir().unwrap();
        let cache = cache(&temp);
        let mut stored = Vec::new();
        for i in 0..20 {
            let staged = stage(&temp, &format!("upload-{i}"), format!("{i}").as_bytes());
            stored.push(cache.place(&staged, "same.png", Slot::First).await.unwrap());
        }
        stored.sort();
        stored.dedup();
        assert_eq!(stored.len(), 20);
        assert_eq!(cache.list().await.unwrap(), stored);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_caches_sharing_a_directory_never_overwrite() {
        let temp = tempfile::tempdir().unwrap();
        let caches = [std::sync::Arc::new(cache(&temp)), std::sync::Arc::new(cache(&temp))];
        let tasks: Vec<_> = (0..200)
            .map(|i| {
                let staged = stage(&temp, &format!("upload-{i}"), format!("{i}").as_bytes());
                let cache = caches[i % 2].clone();
                tokio::spawn(async move { cache.place(&staged, "same.png", Slot::First).await.unwrap() })
            })
            .collect();
        let mut stored = Vec::new();
        for task in tasks {
            stored.push(task.await.unwrap());
        }
        stored.sort();
        stored.dedup();
        assert_eq!(stored.len(), 200);
        assert_eq!(caches[0].list().await.unwrap(), stored);
        // Every upload survived with its own contents.
        let mut contents: Vec<String> =
            stored.iter().map(|p| std::fs::read_to_string(caches[0].resolve(p).unwrap()).unwrap()).collect();
        contents.sort();
        let mut expected: Vec<String> = (0..200).map(|i: usize| i.to_string()).collect();
        expected.sort();
        assert_eq!(contents, expected);
    }

    #[tokio::test]
    async fn test_taken_name_is_skipped() {
        let temp = tempfile::tempdir().unwrap();
        let (first, second) = (cache(&temp), cache(&temp));
        // Push the first cache well past the clock so the stamp it uses next
        // is known in advance.
        let stamp = first.stamper.next() + 1_000_000;
        first.stamper.skip_past(stamp - 1);
        let kept = first.place(&stage(&temp, "one", b"first"), "same.png", Slot::First).await.unwrap();
        assert!(kept.to_str().unwrap().contains(&stamp.to_string()));

        // Second cache is lined up to draw the very same stamp.
        second.stamper.skip_past(stamp - 1);
        let other = second.place(&stage(&temp, "two", b"second"), "same.png", Slot::First).await.unwrap();
        assert_ne!(kept, other);
        assert_eq!(std::fs::read(first.resolve(&kept).unwrap()).unwrap(), b"first");
        assert_eq!(std::fs::read(second.resolve(&other).unwrap()).unwrap(), b"second");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unwritable_cache_dir_is_reported() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let cache = cache(&temp);
        let directory = temp.path().join("public/cache");
        std::fs::create_dir_all(&directory).unwrap();
        std::fs::set_permissions(&directory, std::fs::Permissions::from_mode(0o555)).unwrap();
        // Privileged users ignore directory permissions; nothing to check then.
        let canary = directory.join("canary");
        if std::fs::write(&canary, b"").is_ok() {
            std::fs::remove_file(&canary).unwrap();
            std::fs::set_permissions(&directory, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let staged = stage(&temp, "upload", b"hello");
        let err = cache.place(&staged, "cat.png", Slot::First).await.unwrap_err();
        std::fs::set_permissions(&directory, std::fs::Permissions::from_mode(0o755)).unwrap();
        match &*err {
            ErrorKind::PermissionDenied(path) => assert!(path.starts_with(&directory), "{}", path.display()),
            other => panic!("unexpected error: {other}"),
        }
        assert!(staged.exists());
    }

    #[tokio::test]
    async fn test_place_missing_staged_file() {
        let temp = tempfile::tempdir().unwrap();
        let cache = cache(&temp);
        let missing = temp.path().join("uploads/ghost");
        let err = cache.place(&missing, "ghost.png", Slot::First).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        assert!(cache.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_place_rejects_unusable_name() {
        let temp = tempfile::tempdir().unwrap();
        let cache = cache(&temp);
        let staged = stage(&temp, "blob", b"data");
        let err = cache.place(&staged, "../", Slot::First).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidName(_)));
        assert!(staged.exists(), "a rejected upload stays where it was");
    }

    #[tokio::test]
    async fn test_place_fails_when_cache_dir_is_a_file() {
        let temp = tempfile::tempdir().unwrap();
        let cache = cache(&temp);
        std::fs::write(temp.path().join("public/cache"), b"in the way").unwrap();
        let staged = stage(&temp, "blob", b"data");
        assert!(cache.place(&staged, "x.png", Slot::First).await.is_err());
        assert!(staged.exists());
    }

    #[tokio::test]
    async fn test_restore_moves_back() {
        let temp = tempfile::tempdir().unwrap();
        let cache = cache(&temp);
        let staged = stage(&temp, "abc", b"data");
        let stored = cache.place(&staged, "abc.txt", Slot::Second).await.unwrap();
        cache.restore(&stored, &staged).await.unwrap();
        assert_eq!(std::fs::read(&staged).unwrap(), b"data");
        assert!(!cache.exists(&stored).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let temp = tempfile::tempdir().unwrap();
        let cache = cache(&temp);
        let staged = stage(&temp, "abc", b"data");
        let stored = cache.place(&staged, "abc.txt", Slot::First).await.unwrap();
        cache.delete(&stored).await.unwrap();
        assert!(!cache.exists(&stored).await.unwrap());
        let err = cache.delete(&stored).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_without_cache_dir() {
        let temp = tempfile::tempdir().unwrap();
        assert!(cache(&temp).list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_security() {
        let temp = tempfile::tempdir().unwrap();
        let cache = cache(&temp);
        assert!(cache.resolve(Path::new("../db/hashbank.db")).is_err());
        assert!(cache.exists(Path::new("cache/../../secret")).await.is_err());
        assert!(cache.delete(Path::new("../../file")).await.is_err());
    }
}
