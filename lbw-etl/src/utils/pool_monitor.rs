//! Connection pool monitoring utilities
//!
//! Instrumented transactions that log acquisition wait and hold time, so a
//! stage stalled on the SQLite writer lock shows up in the logs.

use lbw_common::{Error, Result};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::time::Instant;

const SLOW_ACQUIRE_MS: u64 = 1000;
const SLOW_HOLD_MS: u64 = 2000;

/// Transaction that logs how long it waited for and held its connection
pub struct MonitoredTransaction<'c> {
    tx: Option<Transaction<'c, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl<'c> MonitoredTransaction<'c> {
    fn new(tx: Transaction<'c, Sqlite>, caller: &'static str, acquired_at: Instant) -> Self {
        Self {
            tx: Some(tx),
            caller,
            acquired_at,
        }
    }

    fn take(&mut self) -> Result<Transaction<'c, Sqlite>> {
        self.tx
            .take()
            .ok_or_else(|| Error::Internal(format!("{}: transaction already consumed", self.caller)))
    }

    /// Commit and log the hold time
    pub async fn commit(mut self) -> Result<()> {
        let tx = self.take()?;
        tx.commit().await?;

        let held_ms = self.acquired_at.elapsed().as_millis() as u64;
        if held_ms > SLOW_HOLD_MS {
            tracing::warn!(caller = self.caller, held_ms, "Transaction held the writer for {} ms", held_ms);
        } else {
            tracing::debug!(caller = self.caller, held_ms, "Committed");
        }

        Ok(())
    }

    /// Connection to run statements on
    pub fn conn(&mut self) -> Result<&mut SqliteConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(Error::Internal(format!(
                "{}: transaction already consumed",
                self.caller
            ))),
        }
    }
}

impl<'c> Drop for MonitoredTransaction<'c> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            // sqlx rolls back on drop
            tracing::debug!(
                caller = self.caller,
                held_ms = self.acquired_at.elapsed().as_millis() as u64,
                "Abandoned, rolled back"
            );
        }
    }
}

/// Begin a [`MonitoredTransaction`] on `pool`
///
/// # Example
/// ```ignore
/// let mut tx = begin_monitored(&pool, "dimension_upserter::upsert").await?;
/// sqlx::query("...").execute(tx.conn()?).await?;
/// tx.commit().await?;
/// ```
pub async fn begin_monitored<'c>(
    pool: &'c sqlx::SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>> {
    let requested = Instant::now();
    let tx = pool.begin().await?;

    let wait_ms = requested.elapsed().as_millis() as u64;
    if wait_ms > SLOW_ACQUIRE_MS {
        tracing::warn!(caller, wait_ms, "Waited {} ms for a connection", wait_ms);
    } else {
        tracing::debug!(caller, wait_ms, "Transaction started");
    }

    Ok(MonitoredTransaction::new(tx, caller, Instant::now()))
}
