//! Archive object keys and the timestamp embedded in them.
//!
//! Archives are stored under `<prefix>/<yyyy>/<mm>/<dd>/<Name>-YYYY-MM-DD-HH-MM-SS.zip`,
//! with every component in UTC. Because the date directories and the file name share
//! the same zero-padded layout, lexicographic key order is chronological order
//! within a prefix.

use std::fmt;
use thiserror::Error;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Default archive base name.
pub const DEFAULT_ARCHIVE_NAME: &str = "Fuze";

/// File extension of archive objects.
pub const ARCHIVE_EXTENSION: &str = ".zip";

const STAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]-[hour]-[minute]-[second]");

const DAY_DIR_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]/[month]/[day]");

/// Length of `YYYY-MM-DD-HH-MM-SS`.
const STAMP_LEN: usize = 19;

/// A key that could not be interpreted as an archive key.
///
/// Never fatal: the scanner logs it and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparsable archive key {key:?}: {reason}")]
pub struct UnparsableKey {
    pub key: String,
    pub reason: String,
}

impl UnparsableKey {
    fn new(key: &str, reason: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// An archive key together with the UTC timestamp parsed from its name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveKey {
    key: String,
    timestamp: OffsetDateTime,
}

impl ArchiveKey {
    /// The full object key.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// The timestamp embedded in the key.
    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn into_string(self) -> String {
        self.key
    }
}

impl fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl AsRef<str> for ArchiveKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

/// Parses archive keys and derives listing offsets for a given archive base name.
#[derive(Clone, Debug)]
pub struct KeyParser {
    archive_name: String,
}

impl Default for KeyParser {
    fn default() -> Self {
        Self::new(DEFAULT_ARCHIVE_NAME)
    }
}

impl KeyParser {
    pub fn new(archive_name: impl Into<String>) -> Self {
        Self {
            archive_name: archive_name.into(),
        }
    }

    pub fn archive_name(&self) -> &str {
        &self.archive_name
    }

    /// Parse a raw key, returning the reason on failure.
    ///
    /// The last path segment must be exactly `<Name>-YYYY-MM-DD-HH-MM-SS.zip` and at
    /// least one `/` must precede it.
    pub fn try_parse(&self, raw: &str) -> Result<ArchiveKey, UnparsableKey> {
        let (_, file_name) = raw
            .rsplit_once('/')
            .ok_or_else(|| UnparsableKey::new(raw, "no directory component"))?;

        let stamp = file_name
            .strip_prefix(self.archive_name.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|rest| rest.strip_suffix(ARCHIVE_EXTENSION))
            .ok_or_else(|| {
                UnparsableKey::new(
                    raw,
                    format!("file name does not match {}-<timestamp>.zip", self.archive_name),
                )
            })?;

        if !is_stamp_shaped(stamp) {
            return Err(UnparsableKey::new(
                raw,
                "timestamp is not YYYY-MM-DD-HH-MM-SS",
            ));
        }

        let timestamp = PrimitiveDateTime::parse(stamp, STAMP_FORMAT)
            .map_err(|e| UnparsableKey::new(raw, format!("invalid timestamp: {e}")))?
            .assume_utc();

        Ok(ArchiveKey {
            key: raw.to_string(),
            timestamp,
        })
    }

    /// Parse a raw key, logging and discarding it when it is not an archive key.
    pub fn parse(&self, raw: &str) -> Option<ArchiveKey> {
        match self.try_parse(raw) {
            Ok(key) => Some(key),
            Err(err) => {
                tracing::warn!(key = %err.key, reason = %err.reason, "skipping unparsable key");
                None
            }
        }
    }

    /// Archive file name for a timestamp, e.g. `Fuze-2024-03-05-10-00-00.zip`.
    pub fn file_name(&self, timestamp: OffsetDateTime) -> String {
        format!(
            "{}-{}{}",
            self.archive_name,
            format_stamp(timestamp),
            ARCHIVE_EXTENSION
        )
    }

    /// Full object key for an archive written under `prefix` at `timestamp`.
    pub fn object_key(&self, prefix: &str, timestamp: OffsetDateTime) -> String {
        format!(
            "{}{}/{}",
            listing_prefix(prefix),
            format_day_dir(timestamp),
            self.file_name(timestamp)
        )
    }

    /// Key after which a listing for a window beginning at `begin` starts.
    ///
    /// The offset is `lookback` earlier than `begin` so that the archive covering
    /// `begin` is still seen. It has no extension, so it sorts immediately before
    /// the archive with exactly that timestamp.
    ///
    /// Returns `None` when the lookback reaches before year 1, including when it
    /// overflows; the listing must then start at the prefix root.
    pub fn scan_offset(
        &self,
        prefix: &str,
        begin: OffsetDateTime,
        lookback: Duration,
    ) -> Option<String> {
        let start = begin.to_offset(UtcOffset::UTC).checked_sub(lookback)?;
        if start.year() < 1 {
            return None;
        }
        Some(format!(
            "{}{}/{}-{}",
            listing_prefix(prefix),
            start.format(DAY_DIR_FORMAT).ok()?,
            self.archive_name,
            start.format(STAMP_FORMAT).ok()?
        ))
    }
}

/// The listing prefix for a device prefix: always exactly one trailing slash.
pub fn listing_prefix(prefix: &str) -> String {
    format!("{}/", prefix.trim_end_matches('/'))
}

fn is_stamp_shaped(stamp: &str) -> bool {
    stamp.len() == STAMP_LEN
        && stamp.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 | 10 | 13 | 16 => b == b'-',
            _ => b.is_ascii_digit(),
        })
}

fn format_stamp(timestamp: OffsetDateTime) -> String {
    // Formatting into a String only fails for years outside 0..=9999.
    timestamp
        .to_offset(UtcOffset::UTC)
        .format(STAMP_FORMAT)
        .unwrap_or_default()
}

fn format_day_dir(timestamp: OffsetDateTime) -> String {
    timestamp
        .to_offset(UtcOffset::UTC)
        .format(DAY_DIR_FORMAT)
        .unwrap_or_default()
}
