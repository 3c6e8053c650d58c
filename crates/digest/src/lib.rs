//! Content digests for uploaded files.
//!
//! Every digest is a SHA-256 hash rendered as 64 lowercase hexadecimal
//! characters. Because the rendering is normalised, comparing two [`Digest`]s
//! (or their string forms) is the same as comparing the underlying hashes,
//! which in turn stands in for byte-for-byte equality of the files.
//!
//! Three entry points cover the ways content arrives:
//! - [`digest`] for bytes already in memory,
//! - [`digest_reader`] for any blocking [`Read`](std::io::Read), and
//! - [`digest_file`] for a file on disk, read asynchronously in chunks.

pub mod error;
mod hash;

pub use crate::hash::{Digest, digest, digest_file, digest_reader};

/// Length of a rendered digest, in hexadecimal characters.
pub const DIGEST_HEX_LEN: usize = 64;
