use crate::error::{Error, ErrorKind};
use exn::{OptionExt, ResultExt};
use hashbank_digest::Digest;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// What `created_at` defaults to for rows written by this crate.
const TIMESTAMP_MILLIS: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]");
/// SQLite's `CURRENT_TIMESTAMP`, used by databases from before millisecond
/// timestamps.
const TIMESTAMP_SECONDS: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// A comparison about to be recorded.
///
/// The match flag isn't something callers get to choose: it's derived from
/// the two digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComparison {
    file1_digest: Digest,
    file2_digest: Digest,
    file1_path: Option<PathBuf>,
    file2_path: Option<PathBuf>,
}
impl NewComparison {
    pub fn new(file1_digest: Digest, file2_digest: Digest) -> Self {
        Self { file1_digest, file2_digest, file1_path: None, file2_path: None }
    }

    pub fn with_file1_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file1_path = Some(path.into());
        self
    }

    pub fn with_file2_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file2_path = Some(path.into());
        self
    }

    pub fn with_paths(self, file1: impl Into<PathBuf>, file2: impl Into<PathBuf>) -> Self {
        self.with_file1_path(file1).with_file2_path(file2)
    }

    /// Whether both files had identical contents.
    pub fn is_match(&self) -> bool {
        self.file1_digest == self.file2_digest
    }

    pub fn file1_digest(&self) -> &Digest {
        &self.file1_digest
    }

    pub fn file2_digest(&self) -> &Digest {
        &self.file2_digest
    }

    pub fn file1_path(&self) -> Option<&Path> {
        self.file1_path.as_deref()
    }

    pub fn file2_path(&self) -> Option<&Path> {
        self.file2_path.as_deref()
    }
}

/// A digest as read back from the store.
///
/// Everything this crate writes is a SHA-256 digest. Databases from before
/// digests were checked on the way in can hold arbitrary text (the demo
/// fixtures of the first release used `"111111"`); that text is kept,
/// lowercased, instead of making the whole row unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum RecordedDigest {
    Sha256(Digest),
    Legacy(String),
}
impl RecordedDigest {
    fn from_stored(text: String) -> Self {
        let text = text.to_ascii_lowercase();
        match Digest::from_hex(&text) {
            Ok(digest) => Self::Sha256(digest),
            Err(_) => Self::Legacy(text),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Sha256(digest) => digest.as_str(),
            Self::Legacy(text) => text,
        }
    }

    /// The digest, unless this is leftover text from an older database.
    pub fn as_digest(&self) -> Option<&Digest> {
        match self {
            Self::Sha256(digest) => Some(digest),
            Self::Legacy(_) => None,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }
}
impl fmt::Display for RecordedDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
impl PartialEq<Digest> for RecordedDigest {
    fn eq(&self, other: &Digest) -> bool {
        self.as_digest() == Some(other)
    }
}
impl From<Digest> for RecordedDigest {
    fn from(digest: Digest) -> Self {
        Self::Sha256(digest)
    }
}

/// A comparison as stored, including everything the database filled in.
///
/// Serializes with the field names the vault listing has always used
/// (`file1_hash`, `match`, ...), so it can be handed straight to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonRecord {
    pub id: i64,
    #[serde(rename = "file1_hash")]
    pub file1_digest: RecordedDigest,
    #[serde(rename = "file2_hash")]
    pub file2_digest: RecordedDigest,
    /// Where the first file was cached, relative to the public root. `None`
    /// for records from before paths were kept.
    pub file1_path: Option<PathBuf>,
    pub file2_path: Option<PathBuf>,
    #[serde(rename = "match")]
    pub matched: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct ComparisonRow {
    id: i64,
    file1_hash: Option<String>,
    file2_hash: Option<String>,
    file1_path: Option<String>,
    file2_path: Option<String>,
    #[sqlx(rename = "match")]
    matched: Option<bool>,
    created_at: Option<String>,
}
impl TryFrom<ComparisonRow> for ComparisonRecord {
    type Error = Error;
    fn try_from(row: ComparisonRow) -> Result<Self, Self::Error> {
        let file1_digest = parse_digest(row.file1_hash, "file1 hash")?;
        let file2_digest = parse_digest(row.file2_hash, "file2 hash")?;
        let derived = file1_digest == file2_digest;
        // Older rows could have a NULL flag; the digests are the source of truth.
        let matched = row.matched.unwrap_or(derived);
        if matched != derived {
            exn::bail!(ErrorKind::InvalidData("match"));
        }
        Ok(Self {
            id: row.id,
            file1_digest,
            file2_digest,
            file1_path: row.file1_path.map(PathBuf::from),
            file2_path: row.file2_path.map(PathBuf::from),
            matched,
            created_at: parse_timestamp(&row.created_at.ok_or_raise(|| ErrorKind::InvalidData("creation date"))?)?,
        })
    }
}

fn parse_digest(text: Option<String>, field: &'static str) -> Result<RecordedDigest, Error> {
    let digest = RecordedDigest::from_stored(text.ok_or_raise(|| ErrorKind::InvalidData(field))?);
    if digest.is_legacy() {
        tracing::trace!(field, value = digest.as_str(), "stored digest predates validation");
    }
    Ok(digest)
}

/// SQLite stores `created_at` as UTC text without an offset.
fn parse_timestamp(value: &str) -> Result<OffsetDateTime, Error> {
    let parsed = PrimitiveDateTime::parse(value, TIMESTAMP_MILLIS)
        .or_else(|_| PrimitiveDateTime::parse(value, TIMESTAMP_SECONDS))
        .or_raise(|| ErrorKind::InvalidData("creation date"))?;
    Ok(parsed.assume_utc())
}

pub(crate) struct NewComparisonRow {
    pub file1_hash: String,
    pub file2_hash: String,
    pub file1_path: Option<String>,
    pub file2_path: Option<String>,
    pub matched: bool,
}
impl TryFrom<&NewComparison> for NewComparisonRow {
    type Error = Error;
    fn try_from(new: &NewComparison) -> Result<Self, Self::Error> {
        let path = |p: Option<&Path>| {
            p.map(|p| p.to_str().map(str::to_string).ok_or_raise(|| ErrorKind::InvalidData("path")))
                .transpose()
        };
        Ok(Self {
            file1_hash: new.file1_digest.to_string(),
            file2_hash: new.file2_digest.to_string(),
            file1_path: path(new.file1_path())?,
            file2_path: path(new.file2_path())?,
            matched: new.is_match(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbank_digest::digest;
    use rstest::rstest;
    use time::macros::datetime;

    fn row(file1: &Digest, file2: &Digest, matched: Option<bool>) -> ComparisonRow {
        ComparisonRow {
            id: 7,
            file1_hash: Some(file1.to_string()),
            file2_hash: Some(file2.to_string()),
            file1_path: Some("cache/1760875200000_1_a.txt".to_string()),
            file2_path: None,
            matched,
            created_at: Some("2026-10-19 12:00:00.250".to_string()),
        }
    }

    #[test]
    fn test_row_to_model() {
        let hello = digest(b"hello");
        let record = ComparisonRecord::try_from(row(&hello, &hello, Some(true))).unwrap();
        assert_eq!(record.id, 7);
        assert!(record.matched);
        assert_eq!(record.file1_path, Some(PathBuf::from("cache/1760875200000_1_a.txt")));
        assert_eq!(record.file2_path, None);
        assert_eq!(record.created_at, datetime!(2026-10-19 12:00:00.250 UTC));
    }

    #[rstest]
    #[case("2026-10-19 12:00:00.250", datetime!(2026-10-19 12:00:00.250 UTC))]
    #[case("2026-10-19 12:00:00", datetime!(2026-10-19 12:00:00 UTC))]
    fn test_parse_timestamp(#[case] input: &str, #[case] expected: OffsetDateTime) {
        assert_eq!(parse_timestamp(input).unwrap(), expected);
    }

    #[test]
    fn test_unparseable_timestamp() {
        let err = parse_timestamp("yesterday").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("creation date")));
    }

    #[test]
    fn test_missing_match_flag_is_derived() {
        let (hello, world) = (digest(b"hello"), digest(b"world"));
        assert!(ComparisonRecord::try_from(row(&hello, &hello, None)).unwrap().matched);
        assert!(!ComparisonRecord::try_from(row(&hello, &world, None)).unwrap().matched);
    }

    #[test]
    fn test_contradicting_match_flag_is_rejected() {
        let (hello, world) = (digest(b"hello"), digest(b"world"));
        let err = ComparisonRecord::try_from(row(&hello, &world, Some(true))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("match")));
    }

    #[test]
    fn test_missing_digest_is_rejected() {
        let hello = digest(b"hello");
        let mut row = row(&hello, &hello, Some(true));
        row.file2_hash = None;
        let err = ComparisonRecord::try_from(row).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("file2 hash")));
    }

    #[rstest]
    #[case::short("111111", "111111")]
    #[case::uppercase_short("ABCDEF", "abcdef")]
    #[case::not_hex("not a digest", "not a digest")]
    fn test_legacy_digest_is_kept(#[case] stored: &str, #[case] expected: &str) {
        let hello = digest(b"hello");
        let mut row = row(&hello, &hello, None);
        row.file1_hash = Some(stored.to_string());
        row.file2_hash = Some(stored.to_string());
        let record = ComparisonRecord::try_from(row).unwrap();
        assert!(record.file1_digest.is_legacy());
        assert_eq!(record.file1_digest.as_str(), expected);
        // Same stored text on both sides still counts as a match.
        assert!(record.matched);
    }

    #[test]
    fn test_uppercase_stored_digest_is_normalised() {
        let hello = digest(b"hello");
        let mut row = row(&hello, &hello, Some(true));
        row.file1_hash = Some(hello.as_str().to_ascii_uppercase());
        let record = ComparisonRecord::try_from(row).unwrap();
        assert_eq!(record.file1_digest, hello);
        assert_eq!(record.file1_digest, record.file2_digest);
    }

    #[test]
    fn test_legacy_and_real_digest_never_match() {
        let hello = digest(b"hello");
        let mut row = row(&hello, &hello, None);
        row.file2_hash = Some("111111".to_string());
        assert!(!ComparisonRecord::try_from(row).unwrap().matched);
    }

    #[test]
    fn test_model_to_row() {
        let (hello, world) = (digest(b"hello"), digest(b"world"));
        let new = NewComparison::new(hello.clone(), world).with_file1_path("cache/1_1_a.txt");
        assert!(!new.is_match());
        let row = NewComparisonRow::try_from(&new).unwrap();
        assert_eq!(row.file1_hash, hello.as_str());
        assert_eq!(row.file1_path.as_deref(), Some("cache/1_1_a.txt"));
        assert_eq!(row.file2_path, None);
        assert!(!row.matched);
    }

    #[test]
    fn test_serializes_with_vault_field_names() {
        let hello = digest(b"hello");
        let record = ComparisonRecord::try_from(row(&hello, &hello, Some(true))).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["file1_hash"], hello.as_str());
        let legacy = RecordedDigest::from_stored("111111".to_string());
        assert_eq!(serde_json::to_value(&legacy).unwrap(), "111111");
        assert_eq!(json["match"], true);
        assert_eq!(json["file2_path"], serde_json::Value::Null);
        assert!(json["created_at"].as_str().unwrap().starts_with("2026-10-19T12:00:00"));
    }
}
