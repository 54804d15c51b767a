//! Pipeline services
//!
//! One service per stage plus the checkpoint store, the input scanner and
//! the orchestrator that sequences them.

pub mod checkpoint_tracker;
pub mod deduplicator;
pub mod dimension_upserter;
pub mod fact_inserter;
pub mod input_scanner;
pub mod pipeline_orchestrator;
pub mod record_normalizer;
pub mod staging_loader;

pub use checkpoint_tracker::{CheckpointStore, RunContext};
pub use deduplicator::Deduplicator;
pub use dimension_upserter::DimensionUpserter;
pub use fact_inserter::FactInserter;
pub use input_scanner::{InputScanner, ScanError};
pub use pipeline_orchestrator::{context_key, PipelineOrchestrator};
pub use record_normalizer::{normalize, normalize_bytes, normalize_line, RecordNormalizer, ValidationError};
pub use staging_loader::{StagingLoader, DEFAULT_BATCH_SIZE};
