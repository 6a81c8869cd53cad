//! Bounded exponential backoff for exchange requests.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::provider::DataError;

/// Limits on how long a single request is retried.
///
/// The delay before attempt `n` (1-based, counting retries only) is
/// `base * 2^(n-1)`, capped at `max_delay` but never shorter than a
/// `Retry-After` hint from the exchange. `max_attempts` counts every call,
/// the first one included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub max_elapsed: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            max_elapsed: Duration::from_secs(900),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Policy that gives up after the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sleep before retry number `retry` (1 for the first retry).
    pub fn delay_for(&self, base: Duration, retry: u32, err: &DataError) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let backoff = base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        match err.retry_after() {
            Some(hint) => backoff.max(hint),
            None => backoff,
        }
    }

    /// Whether another attempt is allowed after `attempts` calls and `elapsed`
    /// time spent on this request.
    pub fn allows(&self, attempts: u32, elapsed: Duration) -> bool {
        attempts < self.max_attempts.max(1) && elapsed < self.max_elapsed
    }
}
