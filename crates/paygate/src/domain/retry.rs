//! Bounded retry policy for calls to the policy decision point.

use std::time::Duration;

/// Delay function between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed(Duration),
    /// `base * attempt` before retry number `attempt`.
    Linear(Duration),
}

/// Max attempts plus a delay function. The sleeping itself is done by a
/// [`crate::ports::outbound::Sleeper`] so tests can run on a fake clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Linear(base) => base.saturating_mul(attempt.max(1)),
        }
    }

    /// Whether another attempt follows attempt number `attempt`.
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Backoff::Fixed(Duration::from_secs(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(1));
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::new(4, Backoff::Linear(Duration::from_secs(1)));
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(3), Duration::from_secs(3));
    }

    #[test]
    fn test_attempt_bound() {
        let policy = RetryPolicy::new(0, Backoff::Fixed(Duration::ZERO));
        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.has_next(1));

        let policy = RetryPolicy::default();
        assert!(policy.has_next(2));
        assert!(!policy.has_next(3));
    }
}
