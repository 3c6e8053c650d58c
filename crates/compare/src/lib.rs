//! Comparing two uploaded files.
//!
//! The [`Comparator`] ties the other crates together: it digests both staged
//! uploads, moves them into the cache and records the outcome. Any failure
//! before the record is written leaves the uploads where they were staged.

mod comparator;
pub mod error;
mod upload;

pub use crate::comparator::Comparator;
pub use crate::upload::Upload;
