//! Comparison Error Types
//!
//! Each variant names the stage that failed; the error from the crate doing
//! the actual work is kept as a child in the error tree.

use derive_more::{Display, Error};

/// A comparison error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for comparison operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// One of the staged uploads couldn't be read. Nothing was moved.
    #[display("could not read uploaded file")]
    Read,
    /// One of the uploads couldn't be moved into the cache. Nothing was
    /// recorded, and whatever had already been moved was put back.
    #[display("could not place uploaded file in cache")]
    Placement,
    /// Talking to the record store failed. For a comparison, both files have
    /// already been placed and remain in the cache unrecorded.
    #[display("could not access comparison records")]
    Store,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Retrying a failed store would need the uploads staged again.
        matches!(self, Self::Read)
    }
}
