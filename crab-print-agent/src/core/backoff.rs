//! Capped geometric backoff

use std::time::Duration;

const FACTOR: u32 = 2;

/// Doubling delay with an upper bound
///
/// Used by the watcher (poll interval) and the dispatcher (print retries);
/// each owns its own instance.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    failures: u32,
}

impl Backoff {
    /// `max` is raised to `base` if lower
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            current: base,
            failures: 0,
        }
    }

    /// Delay to wait before the next attempt
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Consecutive failures since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failure and return the grown delay
    pub fn fail(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.current = (self.current.saturating_mul(FACTOR)).min(self.max);
        self.current
    }

    /// Back to the base delay
    pub fn reset(&mut self) {
        self.failures = 0;
        self.current = self.base;
    }

    /// Delay after the `attempt`-th failure (1-based): `base * 2^(attempt-1)`, capped
    pub fn delay_for(base: Duration, max: Duration, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        base.saturating_mul(FACTOR.saturating_pow(exp))
            .min(max.max(base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grows_and_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(30));
        assert_eq!(backoff.current(), Duration::from_secs(5));
        assert_eq!(backoff.fail(), Duration::from_secs(10));
        assert_eq!(backoff.fail(), Duration::from_secs(20));
        assert_eq!(backoff.fail(), Duration::from_secs(30));
        assert_eq!(backoff.fail(), Duration::from_secs(30));
        assert_eq!(backoff.failures(), 4);

        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_secs(5));
        assert_eq!(backoff.failures(), 0);
    }

    #[test]
    fn test_cap_below_base() {
        let mut backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(1));
        assert_eq!(backoff.fail(), Duration::from_secs(10));
    }

    #[test]
    fn test_delay_for_attempt() {
        let base = Duration::from_secs(2);
        let max = Duration::from_secs(60);
        assert_eq!(Backoff::delay_for(base, max, 1), Duration::from_secs(2));
        assert_eq!(Backoff::delay_for(base, max, 3), Duration::from_secs(8));
        assert_eq!(Backoff::delay_for(base, max, 10), max);
        assert_eq!(Backoff::delay_for(base, max, 200), max);
    }
}
