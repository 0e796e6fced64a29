use std::time::Duration;

/// Base delay for exponential backoff (milliseconds).
pub const RECONNECT_BASE_DELAY_MS: u64 = 1_000;

/// Maximum delay for exponential backoff (milliseconds).
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// Automatic reconnection attempts before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Retry schedule for automatic reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(RECONNECT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(RECONNECT_MAX_DELAY_MS),
            max_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given 1-based attempt: `min(base * 2^(attempt-1), max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}
