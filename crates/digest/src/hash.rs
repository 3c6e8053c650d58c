use crate::DIGEST_HEX_LEN;
use crate::error::{ErrorKind, Result};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;
use tokio::io::AsyncReadExt;
use tracing::instrument;

// Read size for streaming digests.
const CHUNK_SIZE: usize = 64 * 1024;

/// A SHA-256 digest, always 64 lowercase hex characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Digest(String);

impl Digest {
    /// Parse a hex digest, normalising it to lowercase.
    ///
    /// # Examples
    ///
    /// ```
    /// use hashbank_digest::Digest;
    ///
    /// let upper = Digest::from_hex("2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824").unwrap();
    /// assert_eq!(upper.as_str(), "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824");
    /// assert!(Digest::from_hex("111111").is_err());
    /// ```
    pub fn from_hex(hex: impl AsRef<str>) -> Result<Self> {
        Ok(Self::parse(hex.as_ref())?)
    }

    fn parse(hex: &str) -> std::result::Result<Self, ErrorKind> {
        if hex.len() != DIGEST_HEX_LEN || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ErrorKind::InvalidDigest(hex.to_string()));
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    fn from_hasher(hasher: Sha256) -> Self {
        // hex::encode always produces lowercase output.
        Self(hex::encode(hasher.finalize()))
    }
}
impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
impl FromStr for Digest {
    type Err = crate::error::Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}
// Plain `ErrorKind` rather than `Exn` so serde can report it.
impl TryFrom<String> for Digest {
    type Error = ErrorKind;
    fn try_from(value: String) -> std::result::Result<Self, ErrorKind> {
        Self::parse(&value)
    }
}
impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

/// Digest bytes that are already in memory.
pub fn digest(bytes: impl AsRef<[u8]>) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    Digest::from_hasher(hasher)
}

/// Digest everything a blocking reader yields, one chunk at a time.
pub fn digest_reader(mut reader: impl Read) -> Result<Digest> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => exn::bail!(ErrorKind::Io(e)),
        };
        hasher.update(&buffer[..read]);
    }
    Ok(Digest::from_hasher(hasher))
}

/// Digest a file on disk without loading it whole.
///
/// A missing or unreadable file is an error; there is no fallback digest.
#[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
pub async fn digest_file(path: impl AsRef<Path>) -> Result<Digest> {
    let path = path.as_ref();
    let mut file = tokio::fs::File::open(path).await.map_err(|e| map_io_error(e, path))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let read = file.read(&mut buffer).await.map_err(|e| map_io_error(e, path))?;
        if read == 0 {
            break;
        }
        total += read as u64;
        hasher.update(&buffer[..read]);
    }
    let digest = Digest::from_hasher(hasher);
    tracing::debug!(bytes = total, %digest, "digest computed");
    Ok(digest)
}

fn map_io_error(e: io::Error, path: &Path) -> ErrorKind {
    match e.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
        io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
        _ => ErrorKind::Io(e),
    }
}
