//! Dimension upserter
//!
//! Appends previously unseen users and tracks to `dim_user` / `dim_track`.
//! New surrogate keys are `current max + rank`, where rank orders the new
//! natural keys ascending, so assignment is deterministic and gap-free.
//! Existing rows are never touched.

use lbw_common::Result;

use crate::db::{validate_relation_name, Warehouse};
use crate::models::DimensionUpsert;
use crate::utils::{begin_monitored, retry_on_lock};

/// Dimension upserter
pub struct DimensionUpserter {
    warehouse: Warehouse,
}

impl DimensionUpserter {
    pub fn new(warehouse: Warehouse) -> Self {
        Self { warehouse }
    }

    /// Upsert both dimensions from `dedup_table` in one transaction
    ///
    /// **Algorithm (per dimension):**
    /// 1. Distinct natural keys in staging
    /// 2. Anti-join against the dimension
    /// 3. `row_number() OVER (ORDER BY natural key) + COALESCE(MAX(sk), 0)`
    /// 4. Append
    ///
    /// A track id seen with several (title, artist) variants in one snapshot
    /// keeps only the lexically smallest variant.
    pub async fn upsert(&self, dedup_table: &str) -> Result<DimensionUpsert> {
        validate_relation_name(dedup_table)?;

        let user_sql = format!(
            r#"
            WITH new_users AS (
                SELECT DISTINCT user_id FROM {dedup}
            ),
            existing_max AS (
                SELECT COALESCE(MAX(user_sk), 0) AS max_sk FROM dim_user
            )
            INSERT INTO dim_user (user_sk, user_id)
            SELECT
                row_number() OVER (ORDER BY nu.user_id) + em.max_sk,
                nu.user_id
            FROM new_users nu
            CROSS JOIN existing_max em
            LEFT JOIN dim_user du ON du.user_id = nu.user_id
            WHERE du.user_id IS NULL
            "#,
            dedup = dedup_table
        );

        let track_sql = format!(
            r#"
            WITH variants AS (
                SELECT
                    track_id,
                    track_name,
                    artist_name,
                    row_number() OVER (
                        PARTITION BY track_id ORDER BY track_name, artist_name
                    ) AS variant
                FROM {dedup}
            ),
            new_tracks AS (
                SELECT track_id, track_name, artist_name FROM variants WHERE variant = 1
            ),
            existing_max AS (
                SELECT COALESCE(MAX(track_sk), 0) AS max_sk FROM dim_track
            )
            INSERT INTO dim_track (track_sk, track_id, track_name, artist_name)
            SELECT
                row_number() OVER (ORDER BY nt.track_id) + em.max_sk,
                nt.track_id,
                COALESCE(nt.track_name, ''),
                COALESCE(nt.artist_name, '')
            FROM new_tracks nt
            CROSS JOIN existing_max em
            LEFT JOIN dim_track dt ON dt.track_id = nt.track_id
            WHERE dt.track_id IS NULL
            "#,
            dedup = dedup_table
        );

        let _write_guard = self.warehouse.lock_writes().await;

        let result = retry_on_lock(
            "dimension_upserter::upsert",
            self.warehouse.max_lock_wait_ms(),
            || async {
                let mut tx =
                    begin_monitored(self.warehouse.pool(), "dimension_upserter::upsert").await?;

                let new_users = sqlx::query(&user_sql)
                    .execute(tx.conn()?)
                    .await?
                    .rows_affected();
                let new_tracks = sqlx::query(&track_sql)
                    .execute(tx.conn()?)
                    .await?
                    .rows_affected();

                tx.commit().await?;

                Ok(DimensionUpsert { new_users, new_tracks })
            },
        )
        .await?;

        tracing::info!(
            new_users = result.new_users,
            new_tracks = result.new_tracks,
            "Upserted dim_user and dim_track"
        );

        Ok(result)
    }
}
