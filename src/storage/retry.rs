//! Retry policy for storage operations that cross the network.
//!
//! The policy is applied by [`FileSystem`](super::FileSystem) around transfers to and
//! from non-local backends, so collection and division code never handles transient
//! failures itself.

use super::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff settings.
///
/// The defaults wait 4s, 8s, 16s, ... up to 128s between attempts, for at most
/// seven attempts in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            initial_delay_ms: 4_000,
            max_delay_ms: 128_000,
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1,
        }
    }

    /// Up to `attempts` attempts without sleeping in between.
    #[must_use]
    pub const fn immediate(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1,
        }
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier.max(1))
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        Duration::from_millis(
            self.initial_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }

    /// Whether a failure is worth another attempt.
    #[must_use]
    pub const fn should_retry(&self, err: &StorageError) -> bool {
        err.kind.is_transient()
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the attempt
    /// budget is spent.
    ///
    /// # Errors
    ///
    /// Returns the last error once no further attempt will be made
    pub fn run<T, F>(&self, operation: &str, mut op: F) -> StorageResult<T>
    where
        F: FnMut() -> StorageResult<T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(&err) && attempt < max_attempts => {
                    let delay = self.delay_after(attempt);
                    log::info!(
                        "{operation} failed ({err}), retrying after {delay:?} (attempt {attempt}/{max_attempts})"
                    );
                    std::thread::sleep(delay);
                }
                Err(err) if self.should_retry(&err) => {
                    return Err(err.with_source(format!("gave up after {attempt} attempts")));
                }
                Err(err) => return Err(err),
            }
        }
    }
}
