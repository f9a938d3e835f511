//! # Reconnect delay curve.
//!
//! [`BackoffPolicy`] maps a zero-based reconnect attempt index to the time the
//! loop waits before issuing that attempt:
//!
//! ```text
//! delay(n) = jitter( min(first × factor^n, max) )
//! ```
//!
//! The base for attempt `n` depends only on `n`, so a short jittered delay
//! never drags later delays down with it.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use gattvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_secs(1),
//!     max: Duration::from_secs(30),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//! assert_eq!(backoff.delay(0), Duration::from_secs(1));
//! assert_eq!(backoff.delay(3), Duration::from_secs(8));
//! assert_eq!(backoff.delay(9), Duration::from_secs(30));
//! ```

use std::time::Duration;

use super::jitter::JitterPolicy;

/// Exponential delay with a cap and optional jitter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Wait before the first attempt.
    pub first: Duration,
    /// Upper bound for any single wait (before jitter).
    pub max: Duration,
    /// Growth per attempt; `1.0` keeps the delay constant.
    pub factor: f64,
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `first = 1s`, `factor = 2.0`, `max = 30s`, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Constant delay, no growth.
    pub fn constant(every: Duration) -> Self {
        Self {
            first: every,
            max: every,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Wait before attempt `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if secs.is_finite() && secs >= 0.0 && secs <= self.max.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max
        };
        self.jitter.apply(base.min(self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_doubles_from_one_second() {
        let b = BackoffPolicy::default();
        let got: Vec<u64> = (0..6).map(|n| b.delay(n).as_secs()).collect();
        assert_eq!(got, vec![1, 2, 4, 8, 16, 30]);
    }

    #[test]
    fn test_constant() {
        let b = BackoffPolicy::constant(Duration::from_millis(750));
        for n in [0, 1, 7, 1000] {
            assert_eq!(b.delay(n), Duration::from_millis(750));
        }
    }

    #[test]
    fn test_first_above_max_is_capped() {
        let b = BackoffPolicy {
            first: Duration::from_secs(60),
            max: Duration::from_secs(10),
            factor: 1.0,
            jitter: JitterPolicy::None,
        };
        assert_eq!(b.delay(0), Duration::from_secs(10));
    }

    #[test]
    fn test_overflow_is_capped() {
        let b = BackoffPolicy::default();
        assert_eq!(b.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_never_exceeds_cap() {
        let b = BackoffPolicy {
            jitter: JitterPolicy::Full,
            ..BackoffPolicy::default()
        };
        for n in 0..20 {
            assert!(b.delay(n) <= Duration::from_secs(30));
        }
    }
}
