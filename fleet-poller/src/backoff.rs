//! Capped exponential backoff
//!
//! After a failed poll cycle the interval doubles, up to a configured
//! ceiling. The interval returns to the base once enough consecutive cycles
//! succeed; the required streak is configurable (default: a single success).

use std::time::Duration;

/// Backoff state for the poll loop
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    reset_after: u32,
    failures: u32,
    successes: u32,
}

impl Backoff {
    /// Create a backoff policy.
    ///
    /// `reset_after` is the success streak that resets the interval; zero is
    /// treated as one.
    pub fn new(base: Duration, max: Duration, reset_after: u32) -> Self {
        Self {
            base,
            max,
            reset_after: reset_after.max(1),
            failures: 0,
            successes: 0,
        }
    }

    /// Current delay: `min(base * 2^failures, max)`
    pub fn delay(&self) -> Duration {
        let factor = 1u32.checked_shl(self.failures).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Record a failed cycle
    pub fn on_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        self.successes = 0;
    }

    /// Record a successful cycle, resetting once the streak is reached
    pub fn on_success(&mut self) {
        self.successes = self.successes.saturating_add(1);
        if self.successes >= self.reset_after {
            self.failures = 0;
        }
    }

    /// Consecutive failures recorded since the last reset
    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// True while the delay is above the base interval
    pub fn is_backing_off(&self) -> bool {
        self.failures > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> Backoff {
        Backoff::new(Duration::from_secs(5), Duration::from_secs(300), 1)
    }

    #[test]
    fn test_delay_doubles_up_to_cap() {
        let mut b = backoff();
        assert_eq!(b.delay(), Duration::from_secs(5));

        // After N failures the delay is min(base * 2^N, max).
        let expected = [10u64, 20, 40, 80, 160, 300, 300];
        for want in expected {
            b.on_failure();
            assert_eq!(b.delay(), Duration::from_secs(want));
        }
    }

    #[test]
    fn test_single_success_resets_by_default() {
        let mut b = backoff();
        b.on_failure();
        b.on_failure();
        assert!(b.is_backing_off());

        b.on_success();
        assert!(!b.is_backing_off());
        assert_eq!(b.delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_configurable_reset_streak() {
        let mut b = Backoff::new(Duration::from_secs(5), Duration::from_secs(300), 3);
        b.on_failure();
        b.on_success();
        b.on_success();
        assert!(b.is_backing_off());

        b.on_success();
        assert!(!b.is_backing_off());
    }

    #[test]
    fn test_failure_interrupts_success_streak() {
        let mut b = Backoff::new(Duration::from_secs(5), Duration::from_secs(300), 2);
        b.on_failure();
        b.on_success();
        b.on_failure();
        b.on_success();
        assert!(b.is_backing_off());
    }

    #[test]
    fn test_extreme_failure_count_stays_capped() {
        let mut b = backoff();
        for _ in 0..64 {
            b.on_failure();
        }
        assert_eq!(b.delay(), Duration::from_secs(300));
    }
}
