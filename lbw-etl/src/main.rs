//! lbw-etl - listen warehouse loader
//!
//! Parses a JSON-lines listen export (or every `*.json` file in a
//! directory), stages it in SQLite and merges it into the star schema.
//! Re-running is safe: completed stages are skipped and existing facts are
//! never duplicated.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lbw_common::config::{load_toml_config, locate_toml_config, CompiledDefaults, TomlConfig};
use lbw_etl::{EtlSettings, PipelineOrchestrator, SettingsOverrides};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "lbw-etl")]
#[command(about = "Load listen events into the SQLite warehouse")]
#[command(version)]
struct Args {
    /// SQLite database path or sqlite: URL
    #[arg(long, env = "LBW_DB")]
    db: Option<String>,

    /// Single JSON-lines input file
    #[arg(long, env = "LBW_JSON_FILE", conflicts_with = "json_dir")]
    json_file: Option<PathBuf>,

    /// Directory scanned recursively for *.json inputs
    #[arg(long, env = "LBW_JSON_DIR")]
    json_dir: Option<PathBuf>,

    /// Bootstrap TOML configuration file
    #[arg(long, env = "LBW_CONFIG")]
    config: Option<PathBuf>,

    /// Schema script applied instead of the embedded one
    #[arg(long, env = "LBW_SCHEMA")]
    schema: Option<PathBuf>,

    /// Checkpoint document path
    #[arg(long, env = "LBW_CHECKPOINT")]
    checkpoint: Option<PathBuf>,

    /// Directory for intermediate CSV files
    #[arg(long, env = "LBW_INTERMEDIATE_DIR")]
    intermediate_dir: Option<PathBuf>,

    /// Rows per staging transaction
    #[arg(long, env = "LBW_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Total time spent retrying a locked write
    #[arg(long, env = "LBW_MAX_LOCK_WAIT_MS")]
    max_lock_wait_ms: Option<u64>,

    /// SQLite busy timeout per statement
    #[arg(long, env = "LBW_BUSY_TIMEOUT_MS")]
    busy_timeout_ms: Option<u64>,

    /// Log level when RUST_LOG is unset
    #[arg(long, env = "LBW_LOG_LEVEL")]
    log_level: Option<String>,

    /// Forget the input's checkpoints and run every stage again
    #[arg(long)]
    reset_checkpoint: bool,
}

impl Args {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            database: self.db.clone(),
            schema_path: self.schema.clone(),
            checkpoint_path: self.checkpoint.clone(),
            intermediate_dir: self.intermediate_dir.clone(),
            batch_size: self.batch_size,
            max_lock_wait_ms: self.max_lock_wait_ms,
            busy_timeout_ms: self.busy_timeout_ms,
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let defaults = CompiledDefaults::default();
    // Config decides the log level, so it is read before tracing exists
    let config_path =
        locate_toml_config(args.config.as_deref()).context("Failed to load configuration")?;
    let toml_config = match &config_path {
        Some(path) => load_toml_config(path).context("Failed to load configuration")?,
        None => TomlConfig::default(),
    };
    let settings = EtlSettings::resolve(&args.overrides(), &toml_config, &defaults)
        .context("Invalid configuration")?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Starting lbw-etl");
    match &config_path {
        Some(path) => info!("Loading config from {}", path.display()),
        None => warn!("No config file found, using built-in defaults"),
    }
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", settings.database);
    info!("Checkpoint: {}", settings.checkpoint_path.display());

    let orchestrator = PipelineOrchestrator::connect(&settings).await?;

    if let Some(dir) = &args.json_dir {
        if args.reset_checkpoint {
            for file in lbw_etl::services::InputScanner::new().scan(dir)? {
                orchestrator.reset_checkpoint(&file)?;
            }
        }

        let reports = orchestrator.run_dir(dir).await?;
        let new_facts: u64 = reports.iter().filter_map(|r| r.new_facts).sum();
        info!(
            files = reports.len(),
            new_facts,
            "Pipeline complete: {} files, {} new facts",
            reports.len(),
            new_facts
        );
    } else {
        let input = args.json_file.clone().unwrap_or(defaults.default_input);
        if args.reset_checkpoint {
            orchestrator.reset_checkpoint(&input)?;
        }

        let report = orchestrator.run_file(&input).await?;
        info!(
            run_id = %report.run_id,
            new_facts = report.new_facts.unwrap_or(0),
            "Pipeline complete: {}",
            serde_json::to_string(&report)?
        );
    }

    Ok(())
}
