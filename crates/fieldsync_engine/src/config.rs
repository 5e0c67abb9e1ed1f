//! Tuning knobs for the coordinator and its retry loop.

use std::time::Duration;

/// Settings a device syncs under.
///
/// The defaults suit a phone in the field: batches small enough to survive
/// a flaky uplink, a cycle every thirty seconds, and a few retries with
/// backoff before a cycle is abandoned.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the sync server (e.g. "https://hub.example.net").
    pub base_url: String,
    /// Largest number of outbox entries sent in one push request.
    pub push_batch_size: usize,
    /// How long the scheduler waits between automatic cycles.
    pub sync_interval: Duration,
    /// Retry behavior for failed cycles.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Configuration pointed at `base_url`, with defaults everywhere else.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            push_batch_size: 500,
            sync_interval: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }

    /// Overrides the push batch size.
    #[must_use]
    pub fn with_push_batch_size(mut self, size: usize) -> Self {
        self.push_batch_size = size;
        self
    }

    /// Overrides the automatic cycle interval.
    #[must_use]
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Overrides the retry behavior.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// How hard a cycle tries before giving up.
///
/// Fields are public; override the ones that matter with struct update
/// syntax:
///
/// ```rust
/// use fieldsync_engine::RetryConfig;
///
/// let eager = RetryConfig {
///     max_attempts: 5,
///     ..RetryConfig::default()
/// };
/// assert_eq!(eager.max_attempts, 5);
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts per cycle, counting the first one.
    pub max_attempts: u32,
    /// Wait before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the wait between attempts.
    pub max_delay: Duration,
    /// Growth factor applied to the wait after each failure.
    pub backoff_multiplier: f64,
    /// Whether waits get a random fraction added on top.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Wait before `attempt` (zero-based; the first attempt never waits).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = attempt.saturating_sub(1) as i32;
        let mut delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        delay = delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // At most 25% extra, so a fleet knocked offline together does
            // not retry in lockstep.
            delay += delay * 0.25 * clock_jitter();
        }

        Duration::from_secs_f64(delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

/// Jitter in `[0, 1)` derived from sub-microsecond clock noise.
fn clock_jitter() -> f64 {
    use std::time::SystemTime;
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    f64::from(now.subsec_nanos() % 1024) / 1024.0
}
