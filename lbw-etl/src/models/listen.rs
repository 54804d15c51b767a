//! Listen event shapes
//!
//! `RawListen` mirrors the upstream newline-delimited JSON export with every
//! field optional; validation happens in the record normalizer. `ListenRow`
//! is the canonical, validated row written to the intermediate CSV and the
//! staging relation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Intermediate CSV header, in column order
pub const CSV_HEADER: [&str; 5] = ["user_id", "track_id", "track_name", "artist_name", "listened_at"];

/// One raw listen event as found in the export
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawListen {
    /// Listener identity
    #[serde(default)]
    pub user_name: Option<String>,

    /// Recording identity
    #[serde(default)]
    pub recording_msid: Option<String>,

    /// Epoch seconds, numeric or numeric string
    #[serde(default)]
    pub listened_at: Option<EpochValue>,

    #[serde(default)]
    pub track_metadata: Option<TrackMetadata>,
}

/// Nested metadata block of a raw listen
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackMetadata {
    #[serde(default)]
    pub track_name: Option<String>,

    #[serde(default)]
    pub artist_name: Option<String>,
}

/// `listened_at` accepts both JSON numbers and numeric strings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EpochValue {
    Number(f64),
    Text(String),
}

/// Canonical listen row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenRow {
    pub user_id: String,
    pub track_id: String,
    /// Trimmed, lowercased
    pub track_name: String,
    /// Trimmed, lowercased
    pub artist_name: String,
    #[serde(with = "lbw_common::time::listened_at_format")]
    pub listened_at: DateTime<Utc>,
}

impl ListenRow {
    /// `listened_at` in warehouse column format
    pub fn listened_at_text(&self) -> String {
        lbw_common::time::format_listened_at(&self.listened_at)
    }
}
