//! Configuration for the sync engine.

use msgsync_protocol::UserId;
use rand::Rng;
use std::time::Duration;

/// Configuration of one account's sync.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// The account's own user.
    pub self_user: UserId,
    /// Backoff for a failing event. An event that keeps failing with a
    /// retryable failure is never given up on: `max_attempts` only marks where
    /// the delay stops growing.
    pub event_retry: RetryConfig,
    /// Retry policy for a failing slow sync.
    pub slow_sync_retry: RetryConfig,
    /// Page size when fetching pending events.
    pub pending_page_size: u32,
    /// Whether a history-lost message is inserted after a gap.
    pub history_lost_messages: bool,
}

impl SyncConfig {
    /// Creates a configuration for `self_user`.
    pub fn new(self_user: UserId) -> Self {
        Self {
            self_user,
            event_retry: RetryConfig::default(),
            slow_sync_retry: RetryConfig::new(10).with_max_delay(Duration::from_secs(60)),
            pending_page_size: 500,
            history_lost_messages: true,
        }
    }

    /// Returns the self domain.
    #[must_use]
    pub fn self_domain(&self) -> &str {
        &self.self_user.domain
    }

    /// Sets the event retry policy.
    #[must_use]
    pub fn with_event_retry(mut self, retry: RetryConfig) -> Self {
        self.event_retry = retry;
        self
    }

    /// Sets the slow sync retry policy.
    #[must_use]
    pub fn with_slow_sync_retry(mut self, retry: RetryConfig) -> Self {
        self.slow_sync_retry = retry;
        self
    }

    /// Sets the pending events page size.
    #[must_use]
    pub fn with_pending_page_size(mut self, size: u32) -> Self {
        self.pending_page_size = size.max(1);
        self
    }

    /// Enables or disables history-lost messages.
    #[must_use]
    pub fn with_history_lost_messages(mut self, enabled: bool) -> Self {
        self.history_lost_messages = enabled;
        self
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Creates a configuration retrying immediately, for tests and tools.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::no_retry()
        }
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Disables jitter.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter && delay_secs > 0.0 {
            // Up to 25% on top.
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new(UserId::new("self", "wire.com"))
            .with_pending_page_size(0)
            .with_history_lost_messages(false)
            .with_event_retry(RetryConfig::no_retry());

        assert_eq!(config.self_domain(), "wire.com");
        assert_eq!(config.pending_page_size, 1);
        assert!(!config.history_lost_messages);
        assert_eq!(config.event_retry.max_attempts, 1);
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.delay_for_attempt(3), Duration::ZERO);
        assert_eq!(RetryConfig::immediate(4).max_attempts, 4);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .without_jitter();

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }
}
