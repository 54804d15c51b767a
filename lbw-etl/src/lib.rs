//! lbw-etl library interface
//!
//! Resumable, idempotent ETL of listen events into a star-schema warehouse.
//! The binary in `main.rs` is a thin CLI over [`PipelineOrchestrator`].

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::config::{EtlSettings, SettingsOverrides};
pub use crate::db::Warehouse;
pub use crate::error::{PipelineError, PipelineResult};
pub use crate::models::{RunReport, Stage};
pub use crate::services::PipelineOrchestrator;
