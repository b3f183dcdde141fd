//! Retry backoff for failed jobs.

use resume_config::{BackoffConfig, BackoffStrategy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default cap on a single retry delay (1 hour).
pub const DEFAULT_MAX_DELAY_MS: u64 = 3_600_000;

/// Backoff captured on a job at enqueue time.
///
/// The delay before the next attempt depends only on how many attempts have
/// already run, so the schedule is deterministic and non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backoff {
    /// Strategy.
    #[serde(rename = "type")]
    pub strategy: BackoffStrategy,

    /// Base delay in milliseconds.
    pub delay_ms: u64,

    /// Maximum delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(1000)
    }
}

impl Backoff {
    /// `delay * 2^attempts`, capped.
    pub const fn exponential(delay_ms: u64) -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            delay_ms,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }

    /// The same delay before every retry.
    pub const fn fixed(delay_ms: u64) -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            delay_ms,
            max_delay_ms: delay_ms,
        }
    }

    /// No delay between attempts.
    pub const fn immediate() -> Self {
        Self::fixed(0)
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Delay before the next run of a job that has already run `attempts` times.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.delay_ms,
            BackoffStrategy::Exponential => 2u64
                .checked_pow(attempts)
                .and_then(|factor| self.delay_ms.checked_mul(factor))
                .unwrap_or(u64::MAX),
        };

        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl From<&BackoffConfig> for Backoff {
    fn from(config: &BackoffConfig) -> Self {
        Self {
            strategy: config.strategy,
            delay_ms: config.delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }
}
