//! Digest Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction, the same shape as every other crate in the workspace.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A digest error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for digest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Source file does not exist.
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Source file exists but cannot be opened.
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Reading the source failed part-way through.
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// A string that was supposed to be a hex digest isn't one.
    #[display("invalid digest: {_0:?}")]
    InvalidDigest(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::NotFound(PathBuf::from("uploads/a.png")).to_string(), "file not found: uploads/a.png");
        assert_eq!(ErrorKind::InvalidDigest("xyz".to_string()).to_string(), r#"invalid digest: "xyz""#);
    }

    #[test]
    fn error_kind_retryable() {
        assert!(!ErrorKind::NotFound(PathBuf::from("a")).is_retryable());
        assert!(!ErrorKind::InvalidDigest(String::new()).is_retryable());
        assert!(ErrorKind::Io(IoError::other("interrupted")).is_retryable());
    }
}
