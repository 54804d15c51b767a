//! # LBW Common Library
//!
//! Shared code for the listen warehouse tools:
//! - Error type used across crates
//! - Bootstrap configuration (TOML) loading
//! - SQLite database initialization
//! - Timestamp formatting for warehouse columns

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
