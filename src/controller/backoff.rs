//! # Backoff
//!
//! Two backoff calculators:
//!
//! - [`FibonacciBackoff`] drives requeues after failed reconciliations. The
//!   sequence is calculated in minutes (1m, 1m, 2m, 3m, 5m, 8m, 10m max) and
//!   returned in seconds.
//! - [`ExponentialBackoff`] spaces out retries of transient API read failures
//!   while a dump pod is being polled, and gives up after a bounded number of
//!   consecutive attempts.
//!
//! ```rust
//! use postgres_backup_controller::controller::backoff::FibonacciBackoff;
//!
//! let mut backoff = FibonacciBackoff::new(1, 10);
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! assert_eq!(backoff.next_backoff_seconds(), 120);
//! ```

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at `max_minutes`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Minimum backoff value in minutes (for reset)
    min_minutes: u64,
    /// Previous backoff value in minutes
    prev_minutes: u64,
    /// Current backoff value in minutes
    current_minutes: u64,
    /// Maximum backoff value in minutes
    max_minutes: u64,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff with minimum and maximum values in minutes
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            min_minutes,
            prev_minutes: 0,
            current_minutes: min_minutes,
            max_minutes,
        }
    }

    /// Get the next backoff duration in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result_seconds = self.current_minutes * 60;
        let next_minutes = self.prev_minutes + self.current_minutes;

        self.prev_minutes = self.current_minutes;
        self.current_minutes = std::cmp::min(next_minutes, self.max_minutes);

        result_seconds
    }

    /// Get the next backoff duration as a `Duration` and advance the sequence
    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev_minutes = 0;
        self.current_minutes = self.min_minutes;
    }
}

/// Bounded exponential backoff
///
/// Delays double from `start` up to `max`. After `max_attempts` consecutive
/// delays have been handed out, [`ExponentialBackoff::next_delay`] returns
/// `None` and the caller is expected to give up.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    start: Duration,
    max: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(start: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            start,
            max,
            max_attempts,
            attempts: 0,
        }
    }

    /// Delay before the next retry, or `None` once retries are exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(self.attempts);
        self.attempts += 1;
        Some(std::cmp::min(self.start.saturating_mul(factor), self.max))
    }

    /// Number of retries handed out since the last reset
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Forget previous failures after a successful read
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
