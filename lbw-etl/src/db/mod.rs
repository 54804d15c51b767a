//! Warehouse access for lbw-etl
//!
//! [`Warehouse`] bundles the connection pool with the in-process write lock
//! that serializes surrogate-key assignment. Clones share both, so pipelines
//! running concurrently in one process never compute "current max + rank"
//! from a stale read. Writers in other processes are serialized by SQLite's
//! own single-writer lock.

pub mod counts;

use lbw_common::{Error, Result};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Embedded warehouse schema (idempotent)
pub const SCHEMA_SQL: &str = include_str!("../../sql/create_schema.sql");

/// Raw staging relation
pub const STG_LISTENS: &str = "stg_listens";
/// Deduplicated staging relation
pub const STG_LISTENS_DEDUP: &str = "stg_listens_dedup";

/// Shared warehouse handle
#[derive(Clone)]
pub struct Warehouse {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
    max_lock_wait_ms: u64,
}

impl Warehouse {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
            max_lock_wait_ms,
        }
    }

    /// Open the database and ensure the schema
    ///
    /// `schema_path` selects an alternative script; it must exist. `None`
    /// applies the embedded script.
    pub async fn connect(
        target: &str,
        busy_timeout_ms: u64,
        max_lock_wait_ms: u64,
        schema_path: Option<&Path>,
    ) -> Result<Self> {
        let pool = lbw_common::db::init_database(target, busy_timeout_ms).await?;
        match schema_path {
            Some(path) => lbw_common::db::apply_schema_file(&pool, path).await?,
            None => lbw_common::db::apply_schema_script(&pool, SCHEMA_SQL).await?,
        }
        Ok(Self::new(pool, max_lock_wait_ms))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Budget for retrying a locked write
    pub fn max_lock_wait_ms(&self) -> u64 {
        self.max_lock_wait_ms
    }

    /// Serialize a surrogate-key writer against all clones of this handle
    pub async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }
}

/// Staging relation names used by one pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingTables {
    pub raw: String,
    pub dedup: String,
}

impl Default for StagingTables {
    fn default() -> Self {
        Self {
            raw: STG_LISTENS.to_string(),
            dedup: STG_LISTENS_DEDUP.to_string(),
        }
    }
}

impl StagingTables {
    /// Build from custom names, validating both
    pub fn new(raw: &str, dedup: &str) -> Result<Self> {
        validate_relation_name(raw)?;
        validate_relation_name(dedup)?;
        if raw == dedup {
            return Err(Error::InvalidInput(format!(
                "Staging and deduplicated relation must differ (both '{}')",
                raw
            )));
        }
        Ok(Self {
            raw: raw.to_string(),
            dedup: dedup.to_string(),
        })
    }
}

/// Relation names are interpolated into SQL, so only plain identifiers pass
pub fn validate_relation_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("Invalid relation name '{}'", name)))
    }
}
