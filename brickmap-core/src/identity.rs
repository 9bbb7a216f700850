//! Identity types for BRICKMAP records

use chrono::{DateTime, NaiveDate, Utc};
use sha2::{Digest, Sha256};

/// Mapping identifier, assigned by the store on insert.
/// Stable once assigned; never reused because records are never deleted.
pub type MapId = i32;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 content hash used to compare store states.
pub type ContentHash = [u8; 32];

/// Reserved id of the "Unknown" color sentinel.
pub const UNKNOWN_COLOR_ID: MapId = 0;

/// Display name of the "Unknown" color sentinel.
pub const UNKNOWN_COLOR_NAME: &str = "Unknown";

/// Text format of timestamps at the store and snapshot boundaries.
/// Parsing accepts a missing fractional part.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Render a content hash as lowercase hex.
pub fn content_hash_hex(hash: &ContentHash) -> String {
    hex::encode(hash)
}

/// Format a timestamp the way snapshots and the SQL store carry it.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp written by [`format_timestamp`] (or any
/// `YYYY-MM-DD HH:MM:SS[.fraction]` string). Interpreted as UTC.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    chrono::NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Midnight UTC at the start of `date`.
pub fn start_of_day(date: NaiveDate) -> Timestamp {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}
