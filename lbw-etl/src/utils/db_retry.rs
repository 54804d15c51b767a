//! Lock-contention retry
//!
//! SQLite admits one writer at a time. A write that loses the race fails with
//! "database is locked" once `busy_timeout` runs out; [`retry_on_lock`] backs
//! off and tries again until its own budget is spent. Any other error is
//! returned on the first attempt.

use lbw_common::Result;
use std::future::Future;
use std::time::{Duration, Instant};

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(1000);

/// Re-run `operation` while it fails with lock contention
///
/// Backoff starts at 10 ms and doubles up to 1 s; sleeps never overshoot the
/// remaining budget. When `max_wait_ms` is exhausted the last lock error is
/// returned unchanged.
///
/// Every attempt must open and commit its own transaction.
pub async fn retry_on_lock<F, Fut, T>(operation_name: &str, max_wait_ms: u64, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let budget = Duration::from_millis(max_wait_ms);
    let started = Instant::now();
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt: u32 = 1;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Write went through after lock contention"
                    );
                }
                return Ok(value);
            }
            Err(err) if err.is_lock_contention() => err,
            Err(err) => return Err(err),
        };

        let remaining = budget.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            tracing::error!(
                operation = operation_name,
                attempt,
                max_wait_ms,
                "Giving up on locked database"
            );
            return Err(err);
        }

        let pause = backoff.min(remaining);
        tracing::warn!(
            operation = operation_name,
            attempt,
            pause_ms = pause.as_millis() as u64,
            remaining_ms = remaining.as_millis() as u64,
            "Database locked, backing off"
        );
        tokio::time::sleep(pause).await;

        backoff = (backoff * 2).min(MAX_BACKOFF);
        attempt += 1;
    }
}
