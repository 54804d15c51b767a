//! Configuration resolution for lbw-etl
//!
//! **Priority:** CLI argument → environment (`LBW_*`) → TOML → built-in default
//!
//! The binary's clap definition folds the first two tiers together (each
//! argument carries an `env` fallback) and hands them over as
//! [`SettingsOverrides`].

use lbw_common::config::{CompiledDefaults, TomlConfig};
use lbw_common::{Error, Result};
use std::path::{Path, PathBuf};

use crate::db::StagingTables;

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub database: Option<String>,
    pub schema_path: Option<PathBuf>,
    pub checkpoint_path: Option<PathBuf>,
    pub intermediate_dir: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub max_lock_wait_ms: Option<u64>,
    pub busy_timeout_ms: Option<u64>,
    pub log_level: Option<String>,
}

/// Fully resolved pipeline settings
#[derive(Debug, Clone)]
pub struct EtlSettings {
    /// SQLite path or `sqlite:` URL
    pub database: String,
    /// Alternative schema script; `None` uses the embedded one
    pub schema_path: Option<PathBuf>,
    pub checkpoint_path: PathBuf,
    pub intermediate_dir: PathBuf,
    pub batch_size: usize,
    pub max_lock_wait_ms: u64,
    pub busy_timeout_ms: u64,
    pub log_level: String,
    pub staging: StagingTables,
}

impl EtlSettings {
    /// Merge the configuration tiers
    pub fn resolve(
        overrides: &SettingsOverrides,
        toml: &TomlConfig,
        defaults: &CompiledDefaults,
    ) -> Result<Self> {
        let settings = Self {
            database: overrides
                .database
                .clone()
                .or_else(|| toml.database.clone())
                .unwrap_or_else(|| defaults.database.clone()),
            schema_path: overrides
                .schema_path
                .clone()
                .or_else(|| toml.schema_path.clone()),
            checkpoint_path: overrides
                .checkpoint_path
                .clone()
                .or_else(|| toml.checkpoint_path.clone())
                .unwrap_or_else(|| defaults.checkpoint_path.clone()),
            intermediate_dir: overrides
                .intermediate_dir
                .clone()
                .or_else(|| toml.intermediate_dir.clone())
                .unwrap_or_else(|| defaults.intermediate_dir.clone()),
            batch_size: overrides
                .batch_size
                .or(toml.batch_size)
                .unwrap_or(defaults.batch_size),
            max_lock_wait_ms: overrides
                .max_lock_wait_ms
                .or(toml.max_lock_wait_ms)
                .unwrap_or(defaults.max_lock_wait_ms),
            busy_timeout_ms: overrides
                .busy_timeout_ms
                .or(toml.busy_timeout_ms)
                .unwrap_or(defaults.busy_timeout_ms),
            log_level: overrides
                .log_level
                .clone()
                .or_else(|| toml.logging.level.clone())
                .unwrap_or_else(|| defaults.log_level.clone()),
            staging: StagingTables::default(),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Defaults rooted in one directory (database, checkpoint, intermediates)
    pub fn in_dir(dir: &Path) -> Self {
        let defaults = CompiledDefaults::default();
        Self {
            database: dir.join("warehouse.db").display().to_string(),
            schema_path: None,
            checkpoint_path: dir.join("pipeline_checkpoint.json"),
            intermediate_dir: dir.join("intermediate"),
            batch_size: defaults.batch_size,
            max_lock_wait_ms: defaults.max_lock_wait_ms,
            busy_timeout_ms: defaults.busy_timeout_ms,
            log_level: defaults.log_level,
            staging: StagingTables::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be greater than zero".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(Error::Config("database target is empty".to_string()));
        }
        Ok(())
    }
}
