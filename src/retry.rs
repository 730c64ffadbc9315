//! Bounded retry with capped exponential backoff
//!
//! Build steps run concurrently and take exclusive locks on shared files, so
//! copies and reads can fail transiently. Every retried operation goes
//! through a [`RetryPolicy`] with both an attempt and a wall-clock budget.

use crate::config::schema::RetryConfig;
use crate::error::{MinBuildError, MinBuildResult};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Retry budget for transient IO failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Attempt cap for transient errors that are not lock contention, such
    /// as access denied; these rarely clear up
    pub max_denied_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Total wall-clock budget across all attempts
    pub max_elapsed: Duration,
}

impl RetryPolicy {
    /// Policy that retries `attempts` times without sleeping
    pub fn immediate(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            max_denied_attempts: attempts.max(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_elapsed: Duration::MAX,
        }
    }

    /// Delay before retry number `attempt` (0-based): initial, 2x, 4x...
    /// capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// budget is spent.
    ///
    /// Exhaustion surfaces as [`MinBuildError::RetriesExhausted`] wrapping
    /// the last failure; that is the only way a transient error escapes.
    pub fn run<T>(
        &self,
        operation: &str,
        path: &Path,
        mut op: impl FnMut() -> MinBuildResult<T>,
    ) -> MinBuildResult<T> {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => e,
            };
            attempt += 1;

            let budget = if err.is_lock_contention() {
                self.max_attempts
            } else {
                self.max_denied_attempts.min(self.max_attempts)
            };
            let delay = self.delay_for(attempt - 1);
            let out_of_time = started.elapsed().saturating_add(delay) > self.max_elapsed;
            if attempt >= budget || out_of_time {
                warn!("Giving up {} {} after {} attempts", operation, path.display(), attempt);
                return Err(MinBuildError::RetriesExhausted {
                    operation: operation.to_string(),
                    path: path.to_path_buf(),
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            warn!("Error {} {}: {}, will retry", operation, path.display(), err);
            if !delay.is_zero() {
                debug!("Sleeping {:?} before attempt {}", delay, attempt + 1);
                std::thread::sleep(delay);
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().policy()
    }
}
