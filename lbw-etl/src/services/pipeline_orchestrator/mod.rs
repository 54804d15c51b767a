//! Pipeline orchestrator
//!
//! Drives one input file through the stage sequence:
//! PARSE → LOAD → DEDUPLICATE → UPSERT_DIMENSIONS → INSERT_FACTS
//!
//! # Resumption
//! Each input path is its own run context in the checkpoint store. Completed
//! stages are skipped on re-invocation. A stage's checkpoint is written only
//! after its effects are committed, so an interrupted run resumes at the
//! first unfinished stage.
//!
//! The staging relations are shared by every context. When a context resumes
//! after another one refilled staging, its staging-dependent checkpoints are
//! dropped and LOAD runs again.
//!
//! Checkpoints are tied to the warehouse they were recorded against; pointing
//! the same checkpoint file at another database starts the context over.
//!
//! # Stage implementations
//! Each stage lives in `stages.rs` as a `stage_*` method.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::Instrument;

use crate::config::EtlSettings;
use crate::db::{StagingTables, Warehouse};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{RunReport, Stage};
use crate::services::{
    CheckpointStore, Deduplicator, DimensionUpserter, FactInserter, InputScanner, RunContext,
    StagingLoader,
};

mod stages;

/// Hex digits of the input-path digest in intermediate CSV names
const CSV_DIGEST_LEN: usize = 16;

/// Pipeline orchestrator service
pub struct PipelineOrchestrator {
    warehouse: Warehouse,
    database: String,
    checkpoints: CheckpointStore,
    intermediate_dir: PathBuf,
    staging: StagingTables,
    loader: StagingLoader,
    deduplicator: Deduplicator,
    dimension_upserter: DimensionUpserter,
    fact_inserter: FactInserter,
}

impl PipelineOrchestrator {
    /// Build an orchestrator over an already-open warehouse
    pub fn new(warehouse: Warehouse, settings: &EtlSettings) -> PipelineResult<Self> {
        settings
            .validate()
            .map_err(|e| PipelineError::Setup(e.to_string()))?;
        let loader = StagingLoader::new(warehouse.clone(), settings.batch_size)
            .map_err(|e| PipelineError::Setup(e.to_string()))?;

        Ok(Self {
            database: settings.database.clone(),
            checkpoints: CheckpointStore::new(settings.checkpoint_path.clone()),
            intermediate_dir: settings.intermediate_dir.clone(),
            staging: settings.staging.clone(),
            loader,
            deduplicator: Deduplicator::new(warehouse.clone()),
            dimension_upserter: DimensionUpserter::new(warehouse.clone()),
            fact_inserter: FactInserter::new(warehouse.clone()),
            warehouse,
        })
    }

    /// Open the warehouse named in `settings`, ensure the schema, build the orchestrator
    pub async fn connect(settings: &EtlSettings) -> PipelineResult<Self> {
        let warehouse = Warehouse::connect(
            &settings.database,
            settings.busy_timeout_ms,
            settings.max_lock_wait_ms,
            settings.schema_path.as_deref(),
        )
        .await
        .map_err(|e| PipelineError::Setup(e.to_string()))?;

        tracing::info!(database = %settings.database, "Warehouse ready");
        Self::new(warehouse, settings)
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Intermediate CSV for an input file: `<intermediate_dir>/<stem>-<digest>.csv`
    ///
    /// The digest covers the whole input path, so inputs sharing a file name
    /// in different directories never share a CSV.
    pub fn intermediate_csv_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "listens".to_string());
        let digest = format!("{:x}", Sha256::digest(context_key(input).as_bytes()));
        self.intermediate_dir
            .join(format!("{}-{}.csv", stem, &digest[..CSV_DIGEST_LEN]))
    }

    /// Drop every checkpoint recorded for `input`
    pub fn reset_checkpoint(&self, input: &Path) -> PipelineResult<()> {
        let mut context = self.checkpoints.open_context(&context_key(input))?;
        context.reset()?;
        tracing::info!(context = %context.key(), "Checkpoint reset");
        Ok(())
    }

    /// Run every stage for one input file, skipping completed ones
    pub async fn run_file(&self, input: &Path) -> PipelineResult<RunReport> {
        let key = context_key(input);
        let mut report = RunReport::new(key.clone());
        let span = tracing::info_span!("pipeline_run", run_id = %report.run_id, input = %key);

        self.run_stages(input, &key, &mut report)
            .instrument(span)
            .await?;
        Ok(report)
    }

    async fn run_stages(&self, input: &Path, key: &str, report: &mut RunReport) -> PipelineResult<()> {
        let mut context = self.checkpoints.open_context(key)?;
        let csv_path = self.intermediate_csv_path(input);

        context.bind_target(&self.database)?;

        self.reconcile(&mut context, &csv_path)?;

        if context.is_finished() {
            tracing::info!("All stages already complete, nothing to do");
        }

        for stage in Stage::ALL {
            if context.is_complete(stage) {
                tracing::info!(stage = %stage, "Skipping {} (already done)", stage);
                report.skipped_stages.push(stage);
                continue;
            }

            context.begin(stage);
            let started = std::time::Instant::now();

            match self
                .execute_stage(stage, input, &csv_path, &mut context, report)
                .await
            {
                Ok(()) => {
                    context
                        .mark_complete(stage)
                        .map_err(|e| PipelineError::stage(stage, e))?;
                    tracing::info!(
                        stage = %stage,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Stage {} complete",
                        stage
                    );
                }
                Err(e) => {
                    context.fail(stage);
                    tracing::error!(stage = %stage, error = %e, "Stage {} failed", stage);
                    return Err(PipelineError::stage(stage, e));
                }
            }
        }

        tracing::info!(
            new_facts = report.new_facts.unwrap_or(0),
            skipped = report.skipped_stages.len(),
            "Pipeline run finished"
        );
        Ok(())
    }

    /// Run every `*.json` file below `dir` in path order
    ///
    /// Stops at the first failing file; files already processed keep their
    /// checkpoints.
    pub async fn run_dir(&self, dir: &Path) -> PipelineResult<Vec<RunReport>> {
        let files = InputScanner::new()
            .scan(dir)
            .map_err(|e| PipelineError::Setup(e.to_string()))?;

        tracing::info!(dir = %dir.display(), files = files.len(), "Processing input directory");

        let mut reports = Vec::with_capacity(files.len());
        for file in files {
            reports.push(self.run_file(&file).await?);
        }
        Ok(reports)
    }

    /// Align checkpoints with what is actually on disk and in staging
    fn reconcile(&self, context: &mut RunContext, csv_path: &Path) -> PipelineResult<()> {
        if context.is_finished() {
            return Ok(());
        }

        // Staging holds another context's rows
        let staged = context
            .completed_stages()
            .iter()
            .any(|stage| stage.uses_staging());
        if staged && !context.owns_staging() {
            tracing::info!("Staging was refilled by another run, reloading");
            context.invalidate_from(Stage::Load)?;
        }

        // Intermediate CSV discarded before LOAD consumed it
        if context.is_complete(Stage::Parse) && !context.is_complete(Stage::Load) && !csv_path.is_file()
        {
            tracing::info!(csv = %csv_path.display(), "Intermediate CSV missing, parsing again");
            context.invalidate_from(Stage::Parse)?;
        }

        Ok(())
    }
}

/// Run-context key for an input path
pub fn context_key(input: &Path) -> String {
    input.display().to_string()
}
