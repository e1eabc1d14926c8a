//! Exponential-backoff delay calculation for the integration retry loop.
//!
//! The integration client owns its own retry loop (status-code classification
//! decides what retries at all), so this type only answers "how long to sleep
//! before attempt N".

use std::time::Duration;

/// Retry policy: `max_retries` attempts, sleeping `retry_delay × 2^attempt`
/// between them, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
            ..Default::default()
        }
    }

    /// Backoff before re-attempting after attempt `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay = self
            .retry_delay
            .saturating_mul(u32::try_from(factor).unwrap_or(u32::MAX));
        delay.min(self.max_delay)
    }

    /// Whether another attempt remains after attempt `attempt` (0-based).
    pub fn has_attempts_after(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_retries
    }
}
