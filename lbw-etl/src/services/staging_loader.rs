//! Staging loader
//!
//! Streams the intermediate CSV into the raw staging relation in fixed-size
//! batches. The first batch replaces whatever the relation held; later
//! batches append. A failure mid-load leaves a partial relation behind, so a
//! retry must restart this stage from the beginning.

use std::path::Path;

use lbw_common::{Error, Result};
use sqlx::SqliteConnection;

use crate::db::{validate_relation_name, Warehouse};
use crate::models::ListenRow;
use crate::utils::begin_monitored;

/// Default rows per batch
pub const DEFAULT_BATCH_SIZE: usize = 50_000;

/// Staging loader
pub struct StagingLoader {
    warehouse: Warehouse,
    batch_size: usize,
}

impl StagingLoader {
    pub fn new(warehouse: Warehouse, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidInput("batch_size must be greater than zero".to_string()));
        }
        Ok(Self { warehouse, batch_size })
    }

    /// Load every row of `csv_path` into `stg_table`
    ///
    /// Returns the number of rows loaded. An input with zero rows still
    /// empties the relation so a previous run's rows are not picked up.
    pub async fn load_csv(&self, csv_path: &Path, stg_table: &str) -> Result<u64> {
        validate_relation_name(stg_table)?;

        let mut reader = csv::Reader::from_path(csv_path)?;
        let mut rows = reader.deserialize::<ListenRow>();

        let mut total_rows: u64 = 0;
        let mut batch_index = 0usize;
        let mut batch: Vec<ListenRow> = Vec::with_capacity(self.batch_size.min(DEFAULT_BATCH_SIZE));

        loop {
            batch.clear();
            for row in rows.by_ref().take(self.batch_size) {
                batch.push(row?);
            }

            let first_batch = batch_index == 0;
            if batch.is_empty() && !first_batch {
                break;
            }

            self.write_batch(stg_table, &batch, first_batch).await?;
            batch_index += 1;
            total_rows += batch.len() as u64;

            tracing::info!(
                table = stg_table,
                batch = batch_index,
                rows = batch.len(),
                total = total_rows,
                "Batch {}: inserted {} rows into {}, total {}",
                batch_index,
                batch.len(),
                stg_table,
                total_rows
            );

            if batch.len() < self.batch_size {
                break;
            }
        }

        tracing::info!(
            table = stg_table,
            total = total_rows,
            "All batches inserted into {}. Total {} rows",
            stg_table,
            total_rows
        );

        Ok(total_rows)
    }

    /// Insert one batch in its own transaction
    async fn write_batch(&self, stg_table: &str, batch: &[ListenRow], replace: bool) -> Result<()> {
        let mut tx = begin_monitored(self.warehouse.pool(), "staging_loader::write_batch").await?;
        let conn = tx.conn()?;

        if replace {
            ensure_staging_table(conn, stg_table).await?;
            sqlx::query(&format!("DELETE FROM {}", stg_table))
                .execute(&mut *conn)
                .await?;
        }

        let insert_sql = format!(
            "INSERT INTO {} (user_id, track_id, track_name, artist_name, listened_at) \
             VALUES (?, ?, ?, ?, ?)",
            stg_table
        );
        for row in batch {
            sqlx::query(&insert_sql)
                .bind(&row.user_id)
                .bind(&row.track_id)
                .bind(&row.track_name)
                .bind(&row.artist_name)
                .bind(row.listened_at_text())
                .execute(&mut *conn)
                .await?;
        }

        tx.commit().await
    }
}

async fn ensure_staging_table(conn: &mut SqliteConnection, stg_table: &str) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            user_id TEXT,
            track_id TEXT,
            track_name TEXT,
            artist_name TEXT,
            listened_at TEXT
        )
        "#,
        stg_table
    ))
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::counts::row_count;
    use tempfile::TempDir;

    const HEADER: &str = "user_id,track_id,track_name,artist_name,listened_at\n";

    fn write_csv(dir: &TempDir, name: &str, rows: usize) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut content = HEADER.to_string();
        for i in 0..rows {
            content.push_str(&format!("user{},msid{},song,artist,2021-01-01 00:00:{:02}\n", i, i, i % 60));
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    async fn warehouse() -> Warehouse {
        Warehouse::connect("sqlite::memory:", 250, 5000, None).await.unwrap()
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        assert!(StagingLoader::new(warehouse().await, 0).is_err());
    }

    #[tokio::test]
    async fn test_loads_across_batches_without_loss() {
        let dir = TempDir::new().unwrap();
        let csv = write_csv(&dir, "a.csv", 7);
        let wh = warehouse().await;

        let loader = StagingLoader::new(wh.clone(), 3).unwrap();
        let loaded = loader.load_csv(&csv, "stg_listens").await.unwrap();

        assert_eq!(loaded, 7);
        assert_eq!(row_count(wh.pool(), "stg_listens").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_exact_multiple_of_batch_size() {
        let dir = TempDir::new().unwrap();
        let csv = write_csv(&dir, "a.csv", 6);
        let wh = warehouse().await;

        let loaded = StagingLoader::new(wh.clone(), 3)
            .unwrap()
            .load_csv(&csv, "stg_listens")
            .await
            .unwrap();

        assert_eq!(loaded, 6);
        assert_eq!(row_count(wh.pool(), "stg_listens").await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_second_load_replaces_previous_contents() {
        let dir = TempDir::new().unwrap();
        let wh = warehouse().await;
        let loader = StagingLoader::new(wh.clone(), 2).unwrap();

        loader.load_csv(&write_csv(&dir, "a.csv", 5), "stg_listens").await.unwrap();
        loader.load_csv(&write_csv(&dir, "b.csv", 3), "stg_listens").await.unwrap();

        assert_eq!(row_count(wh.pool(), "stg_listens").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_empty_input_clears_staging() {
        let dir = TempDir::new().unwrap();
        let wh = warehouse().await;
        let loader = StagingLoader::new(wh.clone(), 10).unwrap();

        loader.load_csv(&write_csv(&dir, "a.csv", 4), "stg_listens").await.unwrap();
        let loaded = loader.load_csv(&write_csv(&dir, "empty.csv", 0), "stg_listens").await.unwrap();

        assert_eq!(loaded, 0);
        assert_eq!(row_count(wh.pool(), "stg_listens").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_custom_staging_table_created() {
        let dir = TempDir::new().unwrap();
        let wh = warehouse().await;

        StagingLoader::new(wh.clone(), 10)
            .unwrap()
            .load_csv(&write_csv(&dir, "a.csv", 2), "stg_custom")
            .await
            .unwrap();

        assert_eq!(row_count(wh.pool(), "stg_custom").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_malformed_csv_fails_stage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, format!("{}u,t,n,a,not-a-time\n", HEADER)).unwrap();

        let result = StagingLoader::new(warehouse().await, 10)
            .unwrap()
            .load_csv(&path, "stg_listens")
            .await;
        assert!(matches!(result, Err(Error::Csv(_))));
    }
}
