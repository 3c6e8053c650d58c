//! Cache backend trait and implementations.
//!
//! The [`CacheBackend`] trait is the seam between the comparison pipeline
//! and wherever placed files end up. [`LocalCache`] is the real thing; with
//! the `mock` feature enabled, [`MockCache`] keeps files in memory for tests.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalCache;
#[cfg(feature = "mock")]
pub use self::mock::MockCache;
use crate::Slot;
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Where uploaded files go to live once they've been compared.
///
/// # Path Handling
/// Paths handed out by [`place()`](Self::place) (and accepted by every other
/// method) are *stored paths*: relative to the backend's public root and
/// validated with [`validate_path`](crate::validate_path). They are what
/// gets written to the record store.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use hashbank_storage::{CacheBackend, Slot, error::Result};
///
/// async fn keep(cache: &dyn CacheBackend, staged: &Path) -> Result<()> {
///     let stored = cache.place(staged, "holiday.jpg", Slot::First).await?;
///     assert!(cache.exists(&stored).await?);
///     println!("serving from {}", cache.resolve(&stored)?.display());
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Move a staged upload into the cache.
    ///
    /// On success the staged file is gone and the returned stored path names
    /// the only copy. The cache directory is created first if needed.
    ///
    /// # Errors
    /// - [`InvalidName`](crate::error::ErrorKind::InvalidName) if nothing
    ///   usable is left of `original_name` after sanitising.
    /// - [`NotFound`](crate::error::ErrorKind::NotFound) if the staged file
    ///   doesn't exist.
    /// - [`CrossDevice`](crate::error::ErrorKind::CrossDevice) if the move
    ///   can't be done atomically.
    async fn place(&self, staged: &Path, original_name: &str, slot: Slot) -> Result<PathBuf>;

    /// Undo a [`place()`](Self::place): move a stored file back to where it
    /// was staged.
    async fn restore(&self, stored: &Path, staged: &Path) -> Result<()>;

    /// Check if a stored file exists.
    async fn exists(&self, stored: &Path) -> Result<bool>;

    /// Turn a stored path into the location it can be served from.
    fn resolve(&self, stored: &Path) -> Result<PathBuf>;

    /// Delete a stored file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, stored: &Path) -> Result<()>;

    /// List every stored file in the cache, sorted.
    ///
    /// A cache directory that doesn't exist yet is empty, not an error.
    async fn list(&self) -> Result<Vec<PathBuf>>;
}
