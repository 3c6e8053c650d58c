//! Path validation for stored (cache-relative) paths.
//!
//! Stored paths come back out of the record store and get joined onto the
//! public root to be served, so they must never be able to point outside it.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a stored path and returns it normalised.
///
/// Ensures that paths don't escape the public root (no `..` traversal past
/// the start), contain no null bytes, and aren't empty.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use hashbank_storage::validate_path;
/// assert!(validate_path("cache/1700000000000_1_cat.png").is_ok());
/// assert!(validate_path("../db/hashbank.db").is_err());
/// assert!(validate_path("cache/../../etc/passwd").is_err());
/// assert_eq!(
///     validate_path("./cache//1700000000000_2_dog.png").unwrap(),
///     Path::new("cache/1700000000000_2_dog.png")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("cache/1_1_a.png", "cache/1_1_a.png")]
    #[case("cache//1_1_a.png", "cache/1_1_a.png")]
    #[case("./cache/./1_1_a.png", "cache/1_1_a.png")]
    #[case("/cache/1_1_a.png", "cache/1_1_a.png")]
    #[case("cache/tmp/../1_1_a.png", "cache/1_1_a.png")]
    #[case("cache/", "cache")]
    fn test_normalised(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate(input).unwrap(), Path::new(expected));
    }

    #[rstest]
    #[case("../hashbank.db")]
    #[case("cache/../../index.html")]
    #[case("..")]
    #[case("cache/a\0b.png")]
    #[case("")]
    #[case(".")]
    #[case("//")]
    fn test_rejected(#[case] input: &str) {
        let err = validate(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }
}
