//! Retry policy and backoff schedules
//!
//! Retry decisions are data: a policy names the error kinds it retries
//! and the delay schedule between attempts. The executor consults it
//! instead of classifying errors in control flow.

use std::collections::HashSet;
use std::time::Duration;

use crate::error::ErrorKind;

/// Delay schedule between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// Same delay after every failed attempt.
    Fixed(Duration),
    /// Delay grows by `multiplier` per failed attempt, capped at `max`.
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
    /// Explicit per-attempt delays; the last entry repeats.
    Schedule(Vec<Duration>),
}

impl Backoff {
    pub fn exponential(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self::Exponential {
            initial,
            max,
            multiplier,
        }
    }

    /// Delay to sleep after `completed_attempts` failed attempts
    /// (1-based: after the first failure pass 1).
    pub fn delay(&self, completed_attempts: u32) -> Duration {
        let completed_attempts = completed_attempts.max(1);
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let factor = multiplier.powi(completed_attempts as i32 - 1);
                let millis = (initial.as_millis() as f64 * factor) as u64;
                Duration::from_millis(millis).min(*max)
            }
            Backoff::Schedule(delays) => match delays.last() {
                None => Duration::ZERO,
                Some(last) => *delays
                    .get(completed_attempts as usize - 1)
                    .unwrap_or(last),
            },
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

/// Bounds and classification for action retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    retryable: HashSet<ErrorKind>,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
            retryable: HashSet::from([ErrorKind::ActionFailed]),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Build a policy. `max_attempts` below 1 is treated as 1 (the
    /// first attempt is not a retry).
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            retryable: HashSet::from([ErrorKind::ActionFailed]),
            jitter: false,
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(1, Backoff::None)
    }

    pub fn retry_on(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable = kinds.into_iter().collect();
        self
    }

    /// Randomize each delay by ±20% to avoid lock-stepped retries.
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether an error of this kind may be retried. Timeouts,
    /// cancellations and caller bugs are never retryable, whatever the
    /// configured set says.
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        match kind {
            ErrorKind::TimedOut | ErrorKind::Cancelled | ErrorKind::InvalidLocator => false,
            _ => self.retryable.contains(&kind),
        }
    }

    /// Delay to sleep before the next attempt, given how many attempts
    /// have already failed.
    pub fn delay_after(&self, completed_attempts: u32) -> Duration {
        let base = self.backoff.delay(completed_attempts);
        if !self.jitter || base.is_zero() {
            return base;
        }
        use rand::Rng;
        let factor = rand::thread_rng().gen_range(0.8..1.2);
        Duration::from_millis((base.as_millis() as f64 * factor) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let backoff = Backoff::exponential(Duration::from_millis(250), Duration::from_secs(2), 2.0);
        assert_eq!(backoff.delay(1), Duration::from_millis(250));
        assert_eq!(backoff.delay(2), Duration::from_millis(500));
        assert_eq!(backoff.delay(3), Duration::from_millis(1000));
        assert_eq!(backoff.delay(4), Duration::from_millis(2000));
        assert_eq!(backoff.delay(5), Duration::from_millis(2000)); // capped
    }

    #[test]
    fn test_fixed_backoff() {
        let backoff = Backoff::Fixed(Duration::from_millis(400));
        assert_eq!(backoff.delay(1), Duration::from_millis(400));
        assert_eq!(backoff.delay(7), Duration::from_millis(400));
    }

    #[test]
    fn test_schedule_repeats_last_entry() {
        let backoff = Backoff::Schedule(vec![
            Duration::from_millis(100),
            Duration::from_millis(300),
        ]);
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(300));
        assert_eq!(backoff.delay(3), Duration::from_millis(300));

        assert_eq!(Backoff::Schedule(vec![]).delay(1), Duration::ZERO);
    }

    #[test]
    fn test_max_attempts_floor() {
        assert_eq!(RetryPolicy::new(0, Backoff::None).max_attempts(), 1);
        assert_eq!(RetryPolicy::new(5, Backoff::None).max_attempts(), 5);
    }

    #[test]
    fn test_retryable_classification() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable(ErrorKind::ActionFailed));
        assert!(!policy.is_retryable(ErrorKind::SessionInactive));

        let policy = policy.retry_on([ErrorKind::ActionFailed, ErrorKind::SessionTransient]);
        assert!(policy.is_retryable(ErrorKind::SessionTransient));
    }

    #[test]
    fn test_never_retries_timeouts_or_cancellation() {
        let policy = RetryPolicy::default().retry_on([
            ErrorKind::TimedOut,
            ErrorKind::Cancelled,
            ErrorKind::InvalidLocator,
            ErrorKind::ActionFailed,
        ]);
        assert!(!policy.is_retryable(ErrorKind::TimedOut));
        assert!(!policy.is_retryable(ErrorKind::Cancelled));
        assert!(!policy.is_retryable(ErrorKind::InvalidLocator));
        assert!(policy.is_retryable(ErrorKind::ActionFailed));
    }

    #[test]
    fn test_jitter_stays_near_base() {
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(1000))).with_jitter();
        for _ in 0..50 {
            let delay = policy.delay_after(1);
            assert!(delay >= Duration::from_millis(800));
            assert!(delay < Duration::from_millis(1200));
        }
    }
}
