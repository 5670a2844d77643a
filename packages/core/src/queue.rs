//! Queue configuration, retry policy and statistics.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay before every retry.
    Fixed,
    /// `base * 2^(attempt - 1)`
    #[default]
    Exponential,
    /// `base * attempt`
    Linear,
}

/// How long a failed job waits before it becomes eligible again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub strategy: BackoffStrategy,
    /// Delay after the first failed attempt (milliseconds).
    pub base_delay_ms: u64,
    /// Upper bound for any single delay (milliseconds).
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with the given bounds.
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            base_delay_ms: base.as_millis() as u64,
            max_delay_ms: max.as_millis() as u64,
        }
    }

    /// Constant delay between attempts.
    pub fn fixed(delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self {
            strategy: BackoffStrategy::Fixed,
            base_delay_ms: ms,
            max_delay_ms: ms,
        }
    }

    /// Retry immediately.
    pub fn immediate() -> Self {
        Self::fixed(Duration::ZERO)
    }

    /// Delay after the given failed attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay_ms,
            BackoffStrategy::Exponential => {
                let exp = attempt.saturating_sub(1).min(32);
                self.base_delay_ms.saturating_mul(1u64 << exp)
            }
            BackoffStrategy::Linear => self.base_delay_ms.saturating_mul(attempt as u64),
        };

        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// Configuration for queue and worker behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of concurrent executors started by default.
    pub concurrency: u32,
    /// Default timeout for a handler invocation (seconds).
    pub default_timeout_secs: u64,
    /// Default max retries for jobs.
    pub default_max_retries: u32,
    /// Extra time past the job timeout before a running lease is reclaimed (seconds).
    pub lease_grace_secs: u64,
    /// How often idle workers ask for work (milliseconds).
    pub poll_interval_ms: u64,
    /// How often the supervisor sweeps expired leases (milliseconds).
    pub sweep_interval_ms: u64,
    /// How long terminal jobs stay queryable in memory (seconds).
    pub retention_secs: u64,
    /// How long archived jobs are kept by the store (seconds).
    pub history_retention_secs: u64,
    /// Graceful stop waits this long for in-flight jobs (seconds).
    pub shutdown_timeout_secs: u64,
    /// Backoff between attempts.
    pub retry: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            default_timeout_secs: 300,
            default_max_retries: 3,
            lease_grace_secs: 30,
            poll_interval_ms: 100,
            sweep_interval_ms: 5_000,
            retention_secs: 3_600,
            history_retention_secs: 7 * 24 * 3_600,
            shutdown_timeout_secs: 30,
            retry: RetryPolicy::default(),
        }
    }
}

impl QueueConfig {
    pub fn with_concurrency(mut self, concurrency: u32) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.default_timeout_secs = timeout_secs;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_lease_grace_secs(mut self, grace: u64) -> Self {
        self.lease_grace_secs = grace;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_secs = timeout.as_secs();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Statistics for the queue's current state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    /// Pending jobs, including those waiting out a backoff.
    pub pending: u64,
    /// Jobs currently owned by an executor.
    pub running: u64,
    /// Succeeded jobs since start.
    pub succeeded: u64,
    /// Jobs that exhausted their retries since start.
    pub failed: u64,
    /// Attempts that failed and were rescheduled.
    pub retried: u64,
}

impl QueueStats {
    /// Total jobs in queue (pending + running).
    pub fn active(&self) -> u64 {
        self.pending + self.running
    }

    /// Total processed jobs.
    pub fn processed(&self) -> u64 {
        self.succeeded + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let policy = RetryPolicy::exponential(Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(60), Duration::from_millis(500));
    }

    #[test]
    fn linear_and_fixed_backoff() {
        let linear = RetryPolicy {
            strategy: BackoffStrategy::Linear,
            base_delay_ms: 10,
            max_delay_ms: 25,
        };
        assert_eq!(linear.delay_for_attempt(2), Duration::from_millis(20));
        assert_eq!(linear.delay_for_attempt(3), Duration::from_millis(25));

        let fixed = RetryPolicy::fixed(Duration::from_millis(7));
        assert_eq!(fixed.delay_for_attempt(9), Duration::from_millis(7));
    }

    #[test]
    fn config_fills_missing_fields_from_defaults() {
        let config: QueueConfig = serde_json::from_str(r#"{"concurrency": 2}"#).unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.default_max_retries, 3);
        assert_eq!(config.retry, RetryPolicy::default());
    }
}
