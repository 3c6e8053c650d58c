//! SQLite store of file comparisons.
//!
//! Every time two uploads are compared, one row lands in the `comparisons`
//! table: both digests, where the two files were placed, whether they
//! matched, and when. Rows are never updated; the table only grows until it
//! is explicitly reset or reseeded.
//!
//! # Schema evolution
//! The table predates some of its columns. On every connect the live schema
//! is introspected and any column from [`EVOLVED_COLUMNS`] that's missing is
//! added as a nullable column, so databases written by older versions keep
//! their rows and simply read back `None` for the newer fields.

mod db;
pub mod error;
mod fixtures;
mod models;
mod repo;
mod schema;

pub use crate::db::Database;
pub use crate::models::{ComparisonRecord, NewComparison, RecordedDigest};
pub use crate::repo::Repository;
pub use crate::schema::{Column, EVOLVED_COLUMNS, SchemaReport};
