//! Reconnect backoff
//!
//! `delay(n) = min(max, min · 2ⁿ)` with ±20 % uniform jitter, never above `max`.
//! An attempt limit of -1 retries forever.

use rand::Rng;
use std::time::Duration;

/// Fraction of the base delay added or removed at random
pub const JITTER: f64 = 0.2;

/// Reconnect policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Attempts before giving up; -1 for unlimited
    pub attempt_limit: i32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            attempt_limit: -1,
        }
    }
}

impl BackoffPolicy {
    /// Delay before zero-based attempt `attempt`, without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.min_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        self.attempt_limit >= 0 && attempts >= self.attempt_limit as u32
    }
}

/// Attempt counter for one channel
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the next attempt, or `None` once the limit is reached
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.policy.exhausted(self.attempts) {
            return None;
        }
        let base = self.policy.base_delay(self.attempts);
        self.attempts += 1;
        let factor = rand::thread_rng().gen_range((1.0 - JITTER)..=(1.0 + JITTER));
        Some(base.mul_f64(factor).min(self.policy.max_delay))
    }

    /// Connection established; start over
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_delay_doubles_up_to_max() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base_delay(0), Duration::from_millis(500));
        assert_eq!(policy.base_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.base_delay(3), Duration::from_millis(4000));
        assert_eq!(policy.base_delay(4), Duration::from_secs(5));
        assert_eq!(policy.base_delay(60), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        for attempt in 0..10 {
            let base = backoff.policy().base_delay(attempt);
            let delay = backoff.next_delay().unwrap();
            assert!(delay >= base.mul_f64(1.0 - JITTER));
            assert!(delay <= base.mul_f64(1.0 + JITTER));
            assert!(delay <= Duration::from_secs(5));
        }
    }

    #[test]
    fn attempt_limit_stops_and_reset_restarts() {
        let mut backoff = Backoff::new(BackoffPolicy {
            attempt_limit: 2,
            ..BackoffPolicy::default()
        });
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert!(backoff.next_delay().is_some());
    }
}
