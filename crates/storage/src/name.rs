//! Naming of placed files.
//!
//! A placed file is called `<stamp>_<slot>_<original name>`. The stamp is a
//! millisecond timestamp that never repeats within one cache, the slot says
//! which side of the comparison the file was, and the original name is kept
//! (sanitised) so the cache stays readable by humans.

use crate::error::{ErrorKind, Result};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use time::UtcDateTime;

/// File names longer than this (in bytes) get truncated. Most filesystems cap
/// a single component at 255 bytes and the stamp and slot need room too.
const MAX_NAME_BYTES: usize = 200;

/// Which side of a comparison a file was uploaded as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    First,
    Second,
}
impl Slot {
    pub fn index(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }
}
impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Hands out strictly increasing millisecond stamps.
///
/// Follows the wall clock, except when two calls land in the same millisecond
/// (or the clock steps backwards): then the previous stamp plus one is used.
#[derive(Debug, Default)]
pub(crate) struct Stamper {
    last: AtomicI64,
}
impl Stamper {
    pub(crate) fn next(&self) -> i64 {
        let now = now_millis();
        let mut previous = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(previous + 1);
            match self.last.compare_exchange_weak(previous, candidate, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return candidate,
                Err(actual) => previous = actual,
            }
        }
    }

    /// Make sure every later stamp is greater than `stamp`.
    ///
    /// Used when a stamp turns out to be taken already, by another cache
    /// sharing the directory: its stamps run in the same range as ours, so
    /// stepping forward by one at a time could collide again and again.
    pub(crate) fn skip_past(&self, stamp: i64) {
        self.last.fetch_max(stamp, Ordering::AcqRel);
    }
}

fn now_millis() -> i64 {
    let millis = UtcDateTime::now().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(millis).unwrap_or(i64::MAX)
}

/// Reduce an uploaded file's original name to something safe to put in a
/// single path component.
///
/// Browsers are supposed to send a bare file name, but some send the full
/// client-side path, and nothing stops a hostile client sending `../../x`.
pub(crate) fn sanitize(original: &str) -> Result<String> {
    let last = original.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        exn::bail!(ErrorKind::InvalidName(original.to_string()));
    }
    Ok(truncate(cleaned, MAX_NAME_BYTES).to_string())
}

/// Keep the tail of the name, since that's where the extension lives.
fn truncate(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut start = name.len() - max;
    while !name.is_char_boundary(start) {
        start += 1;
    }
    &name[start..]
}

pub(crate) fn cache_file_name(stamp: i64, slot: Slot, sanitized: &str) -> String {
    format!("{stamp}_{slot}_{sanitized}")
}
