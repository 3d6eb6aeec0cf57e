//! Retry timing for capture streams.
//!
//! Transient capture failures are retried a bounded number of times with an
//! exponentially growing delay. Once the bound is exceeded the stream stays
//! errored until someone retries it by hand.

use std::time::Duration;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy allowing `max_retries` automatic attempts.
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// A policy that never retries automatically.
    pub fn never() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before automatic attempt number `attempt` (zero-based), or
    /// `None` when the bound has been reached.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(250), Duration::from_secs(4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_until_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(policy.delay_for(0), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(4), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(5), None);
    }

    #[test]
    fn test_never_policy() {
        assert_eq!(RetryPolicy::never().delay_for(0), None);
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(policy.delay_for(40), Some(Duration::from_secs(30)));
    }
}
