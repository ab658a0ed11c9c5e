//! # Conflict Retry
//!
//! Bounded retry with exponential backoff and jitter around calls that are
//! rejected with an optimistic-concurrency conflict. Any other failure is
//! returned immediately; retrying the business logic is left to the requeue
//! policy of the reconciliation loop.

use crate::error::ClientError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy for conflicting writes
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Multiplier applied to the delay after every failed attempt
    pub backoff_multiplier: f64,
    /// Apply 0.5x to 1.5x random jitter to every delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            max_attempts: DEFAULT_CONFLICT_RETRY_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_CONFLICT_RETRY_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_CONFLICT_RETRY_MAX_DELAY_MS),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, delay: Duration) -> Duration {
        if !self.jitter {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64(delay.as_secs_f64() * factor)
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.backoff_multiplier).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Run `operation` until it succeeds, fails with a non-conflict error, or
/// the attempt budget is spent. The last conflict is returned when exhausted.
pub async fn retry_on_conflict<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_conflict() && attempt < max_attempts => {
                let wait = policy.delay_for(delay);
                debug!(
                    operation = %operation_name,
                    attempt,
                    delay_ms = wait.as_millis() as u64,
                    "Conflict on write, retrying with latest version"
                );
                tokio::time::sleep(wait).await;
                delay = policy.next_delay(delay);
            }
            Err(e) => {
                if e.is_conflict() {
                    warn!(
                        operation = %operation_name,
                        attempt,
                        error = %e,
                        "Conflict retries exhausted"
                    );
                }
                return Err(e);
            }
        }
    }
}
