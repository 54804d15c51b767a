//! Stage bodies
//!
//! Every stage returns `lbw_common::Result`; the caller turns a failure into
//! `PipelineError::Stage` and leaves the checkpoint unset.

use std::path::Path;

use lbw_common::{Error, Result};

use super::PipelineOrchestrator;
use crate::db::counts::{max_key, row_count};
use crate::models::{RunReport, Stage};
use crate::services::{RecordNormalizer, RunContext};

impl PipelineOrchestrator {
    pub(super) async fn execute_stage(
        &self,
        stage: Stage,
        input: &Path,
        csv_path: &Path,
        context: &mut RunContext,
        report: &mut RunReport,
    ) -> Result<()> {
        match stage {
            Stage::Parse => self.stage_parse(input, csv_path, report).await,
            Stage::Load => self.stage_load(csv_path, context, report).await,
            Stage::Deduplicate => self.stage_deduplicate(report).await,
            Stage::UpsertDimensions => self.stage_upsert_dimensions(report).await,
            Stage::InsertFacts => self.stage_insert_facts(report).await,
        }
    }

    /// PARSE: JSON lines → intermediate CSV
    ///
    /// File I/O runs on the blocking pool.
    async fn stage_parse(&self, input: &Path, csv_path: &Path, report: &mut RunReport) -> Result<()> {
        tracing::info!(csv = %csv_path.display(), "Stage PARSE");

        let input = input.to_path_buf();
        let csv_path = csv_path.to_path_buf();
        let stats = tokio::task::spawn_blocking(move || RecordNormalizer::parse_file(&input, &csv_path))
            .await
            .map_err(|e| Error::Internal(format!("Parse task panicked: {}", e)))??;

        report.parse = Some(stats);
        Ok(())
    }

    /// LOAD: intermediate CSV → raw staging
    async fn stage_load(
        &self,
        csv_path: &Path,
        context: &mut RunContext,
        report: &mut RunReport,
    ) -> Result<()> {
        tracing::info!(table = %self.staging.raw, "Stage LOAD");

        // Claimed before the first write so a crash mid-load still marks staging as ours
        context.claim_staging()?;
        let rows = self.loader.load_csv(csv_path, &self.staging.raw).await?;

        report.staged_rows = Some(rows);
        Ok(())
    }

    async fn stage_deduplicate(&self, report: &mut RunReport) -> Result<()> {
        tracing::info!(from = %self.staging.raw, to = %self.staging.dedup, "Stage DEDUPLICATE");

        let rows = self
            .deduplicator
            .deduplicate(&self.staging.raw, &self.staging.dedup)
            .await?;

        report.deduplicated_rows = Some(rows);
        Ok(())
    }

    async fn stage_upsert_dimensions(&self, report: &mut RunReport) -> Result<()> {
        tracing::info!("Stage UPSERT_DIMENSIONS");

        let upserted = self.dimension_upserter.upsert(&self.staging.dedup).await?;

        // Keys are gap-free, so the max is the dimension size
        let pool = self.warehouse.pool();
        let users = max_key(pool, "dim_user", "user_sk").await?;
        let tracks = max_key(pool, "dim_track", "track_sk").await?;
        tracing::info!(
            new_users = upserted.new_users,
            new_tracks = upserted.new_tracks,
            users,
            tracks,
            "Dimensions now hold {} users, {} tracks",
            users,
            tracks
        );

        report.dimensions = Some(upserted);
        Ok(())
    }

    async fn stage_insert_facts(&self, report: &mut RunReport) -> Result<()> {
        tracing::info!("Stage INSERT_FACTS");

        let inserted = self.fact_inserter.insert(&self.staging.dedup).await?;

        let total = row_count(self.warehouse.pool(), "fact_listen").await?;
        tracing::info!(inserted, total, "fact_listen now holds {} rows", total);

        report.new_facts = Some(inserted);
        Ok(())
    }
}
