// src/retry.rs

//! Bounded exponential-backoff retry
//!
//! The single backoff policy for every external call site: repository
//! fetches, verification re-fetches, and the fix-broken pass all go through
//! [`with_retry`]. The delay before retry `n` is `initial_delay * 2^(n-1)`,
//! so (5 attempts, 5s) waits 5, 10, 20, 40 seconds between attempts and
//! surfaces the last error once the budget is exhausted.

use crate::error::Result;
use std::time::Duration;
use tracing::warn;

/// Default attempt budget for external calls
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default initial backoff delay
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(2);

/// Run `op` up to `max_attempts` times with exponential backoff between
/// failures, returning the first success or the last error.
pub fn with_retry<T, F>(
    label: &str,
    max_attempts: u32,
    initial_delay: Duration,
    op: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    with_retry_using(label, max_attempts, initial_delay, op, std::thread::sleep)
}

/// Retry loop with an injectable sleep, so tests observe the delay sequence
/// without waiting it out.
fn with_retry_using<T, F, S>(
    label: &str,
    max_attempts: u32,
    initial_delay: Duration,
    mut op: F,
    mut sleep: S,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
    S: FnMut(Duration),
{
    let max_attempts = max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts => {
                let delay = initial_delay * (1u32 << (attempt - 1).min(31));
                warn!(
                    "{label}: attempt {attempt}/{max_attempts} failed ({e}), retrying in {delay:?}"
                );
                sleep(delay);
            }
            Err(e) => return Err(e),
        }
    }

    unreachable!("retry loop always returns within the attempt budget")
}
