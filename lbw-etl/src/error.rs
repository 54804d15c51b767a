//! Error types for lbw-etl
//!
//! Three tiers:
//! - per-record [`ValidationError`](crate::services::ValidationError): skipped
//!   and counted inside the normalizer, never surfaced here
//! - stage failure: the stage's checkpoint stays unset; re-invoke to resume
//! - setup failure: nothing was attempted

use thiserror::Error;

use crate::models::Stage;

/// Pipeline error type
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Schema file missing, database unreachable, bad configuration
    #[error("Setup failed: {0}")]
    Setup(String),

    /// A stage aborted; its checkpoint remains unset
    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: lbw_common::Error,
    },

    /// lbw-common error outside any stage
    #[error("Common error: {0}")]
    Common(#[from] lbw_common::Error),
}

impl PipelineError {
    pub fn stage(stage: Stage, source: lbw_common::Error) -> Self {
        PipelineError::Stage { stage, source }
    }

    /// Stage that failed, if any
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
