//! Cache placement of uploaded files.
//!
//! An upload arrives in a transient staging location. Before a comparison can
//! be recorded, each file is moved (never copied) into the cache directory
//! under the public root, given a collision-free name, and referred to from
//! then on by its path relative to that public root.

pub mod backend;
pub mod error;
mod name;
mod path;

pub use crate::backend::CacheBackend;
pub use crate::name::Slot;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type CacheHandle = Arc<dyn CacheBackend + Send + Sync>;
