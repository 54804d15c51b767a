//! Bootstrap configuration loading
//!
//! The TOML file is optional. Every key in it is optional too; values that are
//! absent fall back to [`CompiledDefaults`]. Callers layer command-line and
//! environment overrides on top (see `lbw-etl`'s `config` module).
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments
//! 2. Environment variables (`LBW_*`)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit TOML config file
pub const CONFIG_ENV_VAR: &str = "LBW_CONFIG";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    /// SQLite database path or `sqlite:` URL
    #[serde(default)]
    pub database: Option<String>,

    /// Alternative schema script; the embedded script is used when unset
    #[serde(default)]
    pub schema_path: Option<PathBuf>,

    /// Checkpoint document location
    #[serde(default)]
    pub checkpoint_path: Option<PathBuf>,

    /// Directory for per-file intermediate CSVs
    #[serde(default)]
    pub intermediate_dir: Option<PathBuf>,

    /// Rows per staging batch
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Total time to keep retrying a locked write
    #[serde(default)]
    pub max_lock_wait_ms: Option<u64>,

    /// SQLite busy_timeout applied on connect
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default)]
    pub level: Option<String>,
}

/// Built-in defaults used when neither CLI, ENV nor TOML supply a value
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub database: String,
    pub checkpoint_path: PathBuf,
    pub intermediate_dir: PathBuf,
    pub default_input: PathBuf,
    pub batch_size: usize,
    pub max_lock_wait_ms: u64,
    pub busy_timeout_ms: u64,
    pub log_level: String,
}

impl Default for CompiledDefaults {
    fn default() -> Self {
        Self {
            database: "data/sqlite/listenbrainz.db".to_string(),
            checkpoint_path: PathBuf::from("pipeline_checkpoint.json"),
            intermediate_dir: PathBuf::from("data/intermediate"),
            default_input: PathBuf::from("data/raw/sample-data.json"),
            batch_size: 50_000,
            max_lock_wait_ms: 5000,
            busy_timeout_ms: 250,
            log_level: "info".to_string(),
        }
    }
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML {} failed: {}", path.display(), e)))
}

/// Find the bootstrap config file without reading it
///
/// An explicitly requested file (argument or `LBW_CONFIG`) must exist. The
/// per-user file `<config_dir>/lbw/config.toml` is used only when present.
/// `None` means built-in defaults apply. Nothing is logged, so callers may
/// run this before a subscriber is installed.
pub fn locate_toml_config(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    let explicit = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path));
    }

    Ok(user_config_path().filter(|path| path.exists()))
}

/// Locate and load the bootstrap config
///
/// Same lookup as [`locate_toml_config`]; a missing per-user file yields an
/// empty config.
pub fn resolve_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    match locate_toml_config(explicit)? {
        Some(path) => {
            info!("Loading config from {}", path.display());
            load_toml_config(&path)
        }
        None => {
            warn!("No config file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Per-user config file location for the platform
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lbw").join("config.toml"))
}
