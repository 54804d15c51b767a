//! Database Test Utilities

use anyhow::Result;
use lbw_etl::{EtlSettings, PipelineOrchestrator};
use sqlx::SqlitePool;
use std::path::PathBuf;
use tempfile::TempDir;

/// Temporary directory holding database, checkpoint and inputs
///
/// TempDir must be kept alive for duration of test
pub struct TestWorkspace {
    pub dir: TempDir,
    pub settings: EtlSettings,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let settings = EtlSettings::in_dir(dir.path());
        Ok(Self { dir, settings })
    }

    /// Path for an input file inside the workspace
    pub fn input(&self, name: &str) -> PathBuf {
        self.dir.path().join("raw").join(name)
    }

    pub async fn orchestrator(&self) -> Result<PipelineOrchestrator> {
        Ok(PipelineOrchestrator::connect(&self.settings).await?)
    }
}

/// Row count of a relation
pub async fn count(pool: &SqlitePool, relation: &str) -> Result<i64> {
    let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", relation))
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Sorted surrogate keys of a dimension
pub async fn surrogate_keys(pool: &SqlitePool, relation: &str, column: &str) -> Result<Vec<i64>> {
    let keys: Vec<i64> = sqlx::query_scalar(&format!(
        "SELECT {} FROM {} ORDER BY {}",
        column, relation, column
    ))
    .fetch_all(pool)
    .await?;
    Ok(keys)
}

/// Facts resolved back to natural keys: (user_id, track_id, listened_at)
pub async fn fact_triples(pool: &SqlitePool) -> Result<Vec<(String, String, String)>> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        r#"
        SELECT u.user_id, t.track_id, f.listened_at
        FROM fact_listen f
        JOIN dim_user u ON u.user_sk = f.user_sk
        JOIN dim_track t ON t.track_sk = f.track_sk
        ORDER BY u.user_id, f.listened_at, t.track_id
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
