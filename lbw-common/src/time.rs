//! Timestamp utilities
//!
//! Warehouse timestamps are stored as `YYYY-MM-DD HH:MM:SS` text in UTC with
//! second precision. That layout sorts lexically in chronological order, which
//! the ranking queries rely on.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{Error, Result};

/// Column format for `listened_at`
pub const LISTENED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Convert epoch seconds to a UTC timestamp, truncating any fraction
///
/// Returns `None` for non-finite values or values outside chrono's range.
pub fn epoch_to_timestamp(epoch_seconds: f64) -> Option<DateTime<Utc>> {
    if !epoch_seconds.is_finite() {
        return None;
    }
    let secs = epoch_seconds.floor();
    if secs < i64::MIN as f64 || secs > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp(secs as i64, 0)
}

/// Format a timestamp for storage
pub fn format_listened_at(ts: &DateTime<Utc>) -> String {
    ts.format(LISTENED_AT_FORMAT).to_string()
}

/// Parse a stored timestamp
pub fn parse_listened_at(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, LISTENED_AT_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::InvalidInput(format!("Invalid timestamp '{}': {}", value, e)))
}

/// serde adapter for `listened_at` columns in the intermediate CSV
pub mod listened_at_format {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_listened_at(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_listened_at(&raw).map_err(serde::de::Error::custom)
    }
}
