//! Configuration for the sync engine.

use rand::Rng;
use std::time::Duration;

/// Configuration for sync sessions.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Retry configuration used by `sync_with_retry`.
    pub retry: RetryConfig,
    /// Maximum number of documents pushed per exchange round. `None` sends
    /// every change in a single round.
    pub batch_limit: Option<usize>,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            retry: RetryConfig::default(),
            batch_limit: None,
        }
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Limits the number of documents pushed per exchange round.
    ///
    /// A limit of zero is treated as one.
    #[must_use]
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = Some(limit.max(1));
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Backoff schedule of [`Synchronizer::sync_with_retry`](crate::Synchronizer::sync_with_retry).
///
/// The wait before retry `n` is `initial_delay * backoff_multiplier^(n-1)`,
/// capped at `max_delay`, plus up to a quarter of it when `add_jitter` is
/// set. Only retryable errors are retried.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Sessions attempted at most, the first one included.
    pub max_attempts: u32,
    /// Wait before the first retry.
    pub initial_delay: Duration,
    /// Upper bound of any wait.
    pub max_delay: Duration,
    /// Growth factor between consecutive waits.
    pub backoff_multiplier: f64,
    /// Randomizes waits so that replicas failing together retry apart.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Allows `max_attempts` sessions, backing off from 100ms up to 30s.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// A single session, never retried.
    #[must_use]
    pub fn once() -> Self {
        Self::new(1).with_initial_delay(Duration::ZERO).with_jitter(false)
    }

    /// Sets the wait before the first retry.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Caps every wait.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor between waits.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Returns the wait before retry number `retry`; zero for the first
    /// attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let Some(steps) = retry.checked_sub(1) else {
            return Duration::ZERO;
        };
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let cap = self.max_delay.as_secs_f64();
        let secs = self.initial_delay.as_secs_f64()
            * self
                .backoff_multiplier
                .powi(i32::try_from(steps).unwrap_or(i32::MAX));
        // NaN and overflow both land on the cap
        let delay = if secs >= 0.0 && secs < cap {
            Duration::from_secs_f64(secs)
        } else {
            self.max_delay
        };
        if self.add_jitter && !delay.is_zero() {
            delay.mul_f64(rand::thread_rng().gen_range(1.0..=1.25))
        } else {
            delay
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
