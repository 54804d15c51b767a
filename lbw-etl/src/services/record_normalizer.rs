//! Record normalizer
//!
//! Turns newline-delimited listen JSON into canonical rows and writes them to
//! the intermediate CSV that the staging loader consumes. A bad line is
//! skipped and counted; it never fails the run.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use lbw_common::{time, Error, Result};
use thiserror::Error;

use crate::models::{EpochValue, ListenRow, ParseStats, RawListen, CSV_HEADER};

/// Per-record validation failure
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Required field absent, null, empty or zero
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// `listened_at` present but not a usable epoch
    #[error("Invalid listened_at: {0}")]
    InvalidTimestamp(String),

    /// Not JSON, or a field has the wrong type
    #[error("Malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Line is not valid UTF-8
    #[error("Invalid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
}

/// Validate and normalize one raw record
pub fn normalize(raw: RawListen) -> std::result::Result<ListenRow, ValidationError> {
    let user_id = required_text(raw.user_name, "user_name")?;
    let track_id = required_text(raw.recording_msid, "recording_msid")?;
    let listened_at = match raw.listened_at {
        None => return Err(ValidationError::MissingField("listened_at")),
        Some(value) => epoch_seconds(value)?,
    };
    let listened_at = time::epoch_to_timestamp(listened_at)
        .ok_or_else(|| ValidationError::InvalidTimestamp(listened_at.to_string()))?;

    let metadata = raw.track_metadata.unwrap_or_default();

    Ok(ListenRow {
        user_id,
        track_id,
        track_name: normalize_text(metadata.track_name.as_deref()),
        artist_name: normalize_text(metadata.artist_name.as_deref()),
        listened_at,
    })
}

/// Parse and normalize one input line
pub fn normalize_line(line: &str) -> std::result::Result<ListenRow, ValidationError> {
    let raw: RawListen = serde_json::from_str(line)?;
    normalize(raw)
}

/// Normalize one raw line as read from disk, without its `\n`
pub fn normalize_bytes(line: &[u8]) -> std::result::Result<ListenRow, ValidationError> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    normalize_line(std::str::from_utf8(line)?)
}

fn required_text(
    value: Option<String>,
    field: &'static str,
) -> std::result::Result<String, ValidationError> {
    match value {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(ValidationError::MissingField(field)),
    }
}

/// Zero counts as missing, same as an empty string
fn epoch_seconds(value: EpochValue) -> std::result::Result<f64, ValidationError> {
    let seconds = match value {
        EpochValue::Number(n) => n,
        EpochValue::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Err(ValidationError::MissingField("listened_at"));
            }
            trimmed
                .parse::<f64>()
                .map_err(|_| ValidationError::InvalidTimestamp(text.clone()))?
        }
    };

    if seconds == 0.0 {
        return Err(ValidationError::MissingField("listened_at"));
    }
    Ok(seconds)
}

fn normalize_text(value: Option<&str>) -> String {
    value.map(|s| s.trim().to_lowercase()).unwrap_or_default()
}

/// Record normalizer
pub struct RecordNormalizer;

impl RecordNormalizer {
    /// Convert a JSON-lines file into the intermediate CSV
    ///
    /// **Algorithm:**
    /// 1. Write the CSV header (always, even when no row survives)
    /// 2. For each line: normalize, write on success, log + count on failure
    /// 3. Flush and report written/skipped counts
    ///
    /// I/O failures on either file abort the stage. A line that is not
    /// UTF-8 is a record failure like any other.
    pub fn parse_file(json_path: &Path, csv_path: &Path) -> Result<ParseStats> {
        if !json_path.is_file() {
            return Err(Error::NotFound(format!("Input file {}", json_path.display())));
        }
        if let Some(parent) = csv_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let reader = BufReader::new(File::open(json_path)?);
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(csv_path)?;
        writer.write_record(CSV_HEADER)?;

        let mut stats = ParseStats::default();

        // Lines are decoded one at a time so bad bytes only cost their own line
        for (index, line) in reader.split(b'\n').enumerate() {
            let line_num = index + 1;
            let line = line?;

            match normalize_bytes(&line) {
                Ok(row) => {
                    writer.serialize(&row)?;
                    stats.written += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        file = %json_path.display(),
                        line = line_num,
                        "Skipping line {}: {}",
                        line_num,
                        e
                    );
                    stats.skipped += 1;
                }
            }
        }

        writer.flush()?;

        tracing::info!(
            file = %json_path.display(),
            written = stats.written,
            skipped = stats.skipped,
            "parse done. Wrote {} rows, skipped {}",
            stats.written,
            stats.skipped
        );

        Ok(stats)
    }
}
