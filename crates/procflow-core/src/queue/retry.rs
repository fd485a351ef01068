//! Retry policy: decides whether a failed leaf runs again and after how long.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ProcedureError};

/// Retry policy for failed leaf procedures.
///
/// Exponential backoff: delay = base_delay * multiplier^(attempt - 1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier.
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier: 2.0,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Delay to wait after the given (1-indexed) failed attempt.
    ///
    /// With base_delay=2s, multiplier=2.0:
    /// - attempt 1: 2s
    /// - attempt 2: 4s
    /// - attempt 3: 8s
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(attempts.saturating_sub(1) as i32);
        Duration::from_secs_f64(delay_secs)
    }

    /// Should a failure after `attempts` attempts be retried?
    ///
    /// Cancellation and timeouts are final.
    pub fn should_retry(&self, attempts: u32, error: &ProcedureError) -> bool {
        if matches!(error.kind(), ErrorKind::Cancelled | ErrorKind::TimedOut) {
            return false;
        }
        attempts < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::first_attempt(1, 2)]
    #[case::second_attempt(2, 4)]
    #[case::third_attempt(3, 8)]
    #[case::attempt_zero_uses_base(0, 2)]
    fn exponential_backoff(#[case] attempts: u32, #[case] expected_secs: u64) {
        let policy = RetryPolicy::new(5, Duration::from_secs(2));
        assert_eq!(policy.next_delay(attempts), Duration::from_secs(expected_secs));
    }

    #[test]
    fn stops_at_max_attempts() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let err = ProcedureError::failed("flaky");
        assert!(policy.should_retry(1, &err));
        assert!(!policy.should_retry(2, &err));
    }

    #[test]
    fn cancellation_is_never_retried() {
        let policy = RetryPolicy::new(10, Duration::from_millis(1));
        assert!(!policy.should_retry(1, &ProcedureError::Cancelled));
        assert!(!policy.should_retry(
            1,
            &ProcedureError::TimedOut {
                after: Duration::from_secs(1)
            }
        ));
    }
}
