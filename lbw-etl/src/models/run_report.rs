//! Pipeline stages and run reporting

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Checkpointed pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    /// Raw JSON lines → intermediate CSV
    #[serde(rename = "csv_parsed")]
    Parse,
    /// Intermediate CSV → `stg_listens`
    #[serde(rename = "csv_loaded")]
    Load,
    /// `stg_listens` → `stg_listens_dedup`
    #[serde(rename = "deduplicated")]
    Deduplicate,
    /// New natural keys → `dim_user`, `dim_track`
    #[serde(rename = "dims_upserted")]
    UpsertDimensions,
    /// New listens → `fact_listen`
    #[serde(rename = "facts_inserted")]
    InsertFacts,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 5] = [
        Stage::Parse,
        Stage::Load,
        Stage::Deduplicate,
        Stage::UpsertDimensions,
        Stage::InsertFacts,
    ];

    /// Persistent checkpoint key
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Parse => "csv_parsed",
            Stage::Load => "csv_loaded",
            Stage::Deduplicate => "deduplicated",
            Stage::UpsertDimensions => "dims_upserted",
            Stage::InsertFacts => "facts_inserted",
        }
    }

    /// Whether this stage reads or writes the shared staging relations
    pub fn uses_staging(&self) -> bool {
        !matches!(self, Stage::Parse)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage lifecycle: Pending → Running → Done
///
/// A failed stage goes back to `Pending`; there is no terminal failure state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StageState {
    Pending,
    Running,
    Done,
}

/// Normalizer line counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    /// Canonical rows written
    pub written: u64,
    /// Lines rejected by validation
    pub skipped: u64,
}

/// Rows appended by the dimension upserter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DimensionUpsert {
    pub new_users: u64,
    pub new_tracks: u64,
}

/// Outcome of one pipeline run over one input file
///
/// Counts are `None` for stages that were skipped because a checkpoint
/// already marked them complete.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub run_context: String,
    pub parse: Option<ParseStats>,
    pub staged_rows: Option<u64>,
    pub deduplicated_rows: Option<u64>,
    pub dimensions: Option<DimensionUpsert>,
    pub new_facts: Option<u64>,
    pub skipped_stages: Vec<Stage>,
}

impl RunReport {
    pub fn new(run_context: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            run_context: run_context.into(),
            parse: None,
            staged_rows: None,
            deduplicated_rows: None,
            dimensions: None,
            new_facts: None,
            skipped_stages: Vec::new(),
        }
    }
}
