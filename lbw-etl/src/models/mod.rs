//! Data models for the listen pipeline

pub mod listen;
pub mod run_report;

pub use listen::{EpochValue, ListenRow, RawListen, TrackMetadata, CSV_HEADER};
pub use run_report::{DimensionUpsert, ParseStats, RunReport, Stage, StageState};
