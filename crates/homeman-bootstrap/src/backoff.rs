//! Exponential backoff schedule for dependency connection attempts.

use std::time::Duration;

/// Retry timing for connecting to a dependency.
///
/// `delay(attempt) = base * 2^attempt`, capped at `max_delay`, for at most
/// `max_attempts` attempts in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl BackoffPolicy {
    /// Creates a policy with default settings.
    ///
    /// Default settings:
    /// - Base delay: 1 second
    /// - Max delay: 60 seconds
    /// - Max attempts: 5 (delays 1, 2, 4, 8, 16 seconds)
    pub fn new() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 5,
        }
    }

    /// Sets the delay after the first failed attempt.
    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    /// Sets the upper bound for any single delay.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Sets the total number of attempts, including the first one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Base delay.
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Upper bound for a single delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Total attempt budget.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the 0-based `attempt` failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        match 1u32.checked_shl(attempt) {
            Some(factor) => self.base.saturating_mul(factor).min(self.max_delay),
            None => self.max_delay,
        }
    }

    /// Delays for every attempt in the budget, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_attempts).map(|a| self.delay(a)).collect()
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new()
    }
}
