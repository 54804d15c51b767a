//! Fact inserter
//!
//! Resolves deduplicated staging rows to surrogate keys and appends the
//! listens `fact_listen` does not hold yet. A listen is identified by its
//! `(user_sk, track_sk, listened_at)` triple; the anti-join on that triple
//! (backed by a UNIQUE constraint) keeps a listen from ever being stored
//! twice, however many files repeat it.

use lbw_common::Result;

use crate::db::{validate_relation_name, Warehouse};
use crate::utils::{begin_monitored, retry_on_lock};

/// Fact inserter
pub struct FactInserter {
    warehouse: Warehouse,
}

impl FactInserter {
    pub fn new(warehouse: Warehouse) -> Self {
        Self { warehouse }
    }

    /// Append new listens from `dedup_table`; returns rows inserted
    ///
    /// Staging rows whose user or track has no dimension row are dropped by
    /// the inner join. Run the dimension upserter on the same snapshot first.
    pub async fn insert(&self, dedup_table: &str) -> Result<u64> {
        validate_relation_name(dedup_table)?;

        let fact_sql = format!(
            r#"
            WITH existing_max AS (
                SELECT COALESCE(MAX(listen_sk), 0) AS max_sk FROM fact_listen
            ),
            candidates AS (
                SELECT DISTINCT
                    du.user_sk,
                    dt.track_sk,
                    d.listened_at
                FROM {dedup} d
                JOIN dim_user du ON du.user_id = d.user_id
                JOIN dim_track dt ON dt.track_id = d.track_id
            )
            INSERT INTO fact_listen (listen_sk, user_sk, track_sk, listened_at)
            SELECT
                row_number() OVER (ORDER BY c.user_sk, c.listened_at, c.track_sk) + em.max_sk,
                c.user_sk,
                c.track_sk,
                c.listened_at
            FROM candidates c
            CROSS JOIN existing_max em
            LEFT JOIN fact_listen f
                   ON f.user_sk = c.user_sk
                  AND f.track_sk = c.track_sk
                  AND f.listened_at = c.listened_at
            WHERE f.listen_sk IS NULL
            "#,
            dedup = dedup_table
        );

        let _write_guard = self.warehouse.lock_writes().await;

        let inserted = retry_on_lock(
            "fact_inserter::insert",
            self.warehouse.max_lock_wait_ms(),
            || async {
                let mut tx = begin_monitored(self.warehouse.pool(), "fact_inserter::insert").await?;
                let inserted = sqlx::query(&fact_sql)
                    .execute(tx.conn()?)
                    .await?
                    .rows_affected();
                tx.commit().await?;
                Ok(inserted)
            },
        )
        .await?;

        tracing::info!(new_facts = inserted, "Inserted new listens into fact_listen");

        Ok(inserted)
    }
}
