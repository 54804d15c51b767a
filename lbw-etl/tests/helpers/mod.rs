//! Test Helper Utilities
//!
//! Shared utilities for testing lbw-etl

pub mod db_utils;
pub mod fixtures;

pub use db_utils::{count, fact_triples, surrogate_keys, TestWorkspace};
pub use fixtures::{listen_line, write_listens};
