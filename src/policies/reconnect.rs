//! # Reconnect rate limiting.
//!
//! While a device's reconnect loop runs, a [`ReconnectPolicy`] is asked before
//! every attempt how long to wait, or whether to give up:
//!
//! ```text
//! attempt index ──► policy.next(&ReconnectContext) ──► Retry(delay) | Stop
//! ```
//!
//! [`BackoffReconnectPolicy`] is the stock implementation: a
//! [`BackoffPolicy`] curve bounded by an attempt count and a wall budget.

use std::time::Duration;

use crate::config::Config;
use crate::device::DeviceId;

use super::backoff::BackoffPolicy;

/// Input to a [`ReconnectPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectContext {
    pub device: DeviceId,
    /// Zero-based index of the attempt being scheduled.
    pub attempt: u32,
    /// Time since the loop started.
    pub total_elapsed: Duration,
}

/// What the reconnect loop does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Issue the next attempt after this delay.
    Retry(Duration),
    /// End the loop.
    Stop,
}

/// Maps the attempt index to the next interval or a stop signal.
pub trait ReconnectPolicy: Send + Sync + 'static {
    fn next(&self, cx: &ReconnectContext) -> ReconnectDecision;
}

impl<F> ReconnectPolicy for F
where
    F: Fn(&ReconnectContext) -> ReconnectDecision + Send + Sync + 'static,
{
    fn next(&self, cx: &ReconnectContext) -> ReconnectDecision {
        self(cx)
    }
}

/// Backoff curve with optional limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffReconnectPolicy {
    pub backoff: BackoffPolicy,
    /// `0` = unlimited.
    pub max_attempts: u32,
    /// `None` = never give up.
    pub give_up_after: Option<Duration>,
}

impl BackoffReconnectPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            backoff: cfg.reconnect_backoff,
            max_attempts: cfg.reconnect_max_attempts,
            give_up_after: cfg.reconnect_give_up_after_opt(),
        }
    }
}

impl Default for BackoffReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ReconnectPolicy for BackoffReconnectPolicy {
    fn next(&self, cx: &ReconnectContext) -> ReconnectDecision {
        if self.max_attempts > 0 && cx.attempt >= self.max_attempts {
            return ReconnectDecision::Stop;
        }
        if self.give_up_after.is_some_and(|budget| cx.total_elapsed >= budget) {
            return ReconnectDecision::Stop;
        }
        ReconnectDecision::Retry(self.backoff.delay(cx.attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cx(attempt: u32, secs: u64) -> ReconnectContext {
        ReconnectContext {
            device: DeviceId::from("d"),
            attempt,
            total_elapsed: Duration::from_secs(secs),
        }
    }

    #[test]
    fn test_unlimited_follows_backoff() {
        let p = BackoffReconnectPolicy {
            backoff: BackoffPolicy::constant(Duration::from_secs(3)),
            max_attempts: 0,
            give_up_after: None,
        };
        assert_eq!(p.next(&cx(500, 100_000)), ReconnectDecision::Retry(Duration::from_secs(3)));
    }

    #[test]
    fn test_stops_after_max_attempts() {
        let p = BackoffReconnectPolicy {
            backoff: BackoffPolicy::default(),
            max_attempts: 2,
            give_up_after: None,
        };
        assert_eq!(p.next(&cx(0, 0)), ReconnectDecision::Retry(Duration::from_secs(1)));
        assert_eq!(p.next(&cx(1, 0)), ReconnectDecision::Retry(Duration::from_secs(2)));
        assert_eq!(p.next(&cx(2, 0)), ReconnectDecision::Stop);
    }

    #[test]
    fn test_stops_after_budget() {
        let p = BackoffReconnectPolicy {
            backoff: BackoffPolicy::default(),
            max_attempts: 0,
            give_up_after: Some(Duration::from_secs(60)),
        };
        assert!(matches!(p.next(&cx(3, 59)), ReconnectDecision::Retry(_)));
        assert_eq!(p.next(&cx(3, 60)), ReconnectDecision::Stop);
    }

    #[test]
    fn test_zero_budget_in_config_means_unbounded() {
        let unbounded = BackoffReconnectPolicy::from_config(&Config::default());
        assert_eq!(unbounded.give_up_after, None);

        let cfg = Config {
            reconnect_give_up_after: Duration::from_secs(30),
            ..Config::default()
        };
        let bounded = BackoffReconnectPolicy::from_config(&cfg);
        assert_eq!(bounded.next(&cx(0, 30)), ReconnectDecision::Stop);
    }
}
