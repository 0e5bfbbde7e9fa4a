use std::time::Duration;

/// Delay used between reconnect attempts when nothing else is configured.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Fixed-delay reconnect schedule.
///
/// Every attempt waits the same amount of time and there is no retry limit.
/// The attempt counter only exists for logging and metrics.
#[derive(Debug, Clone)]
pub struct FixedBackoff {
    delay: Duration,
    attempt: u32,
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}

impl FixedBackoff {
    /// Create a schedule that always waits `delay`.
    pub fn new(delay: Duration) -> Self {
        Self { delay, attempt: 0 }
    }

    /// Return the delay before the next attempt and increment the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.delay
    }

    /// Reset the attempt counter (call after a successful connection).
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The configured delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_never_grows() {
        let mut backoff = FixedBackoff::new(Duration::from_millis(3000));

        for _ in 0..10 {
            assert_eq!(backoff.next_delay(), Duration::from_millis(3000));
        }
        assert_eq!(backoff.attempt(), 10);
    }

    #[test]
    fn test_default_is_three_seconds() {
        let mut backoff = FixedBackoff::default();
        assert_eq!(backoff.next_delay(), Duration::from_secs(3));
    }

    #[test]
    fn test_reset() {
        let mut backoff = FixedBackoff::new(Duration::from_millis(50));

        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
    }

    #[test]
    fn test_attempt_saturates() {
        let mut backoff = FixedBackoff::new(Duration::ZERO);
        backoff.attempt = u32::MAX;

        backoff.next_delay();
        assert_eq!(backoff.attempt(), u32::MAX);
    }
}
