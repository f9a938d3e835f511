//! # Manager configuration.
//!
//! [`Config`] holds the read-only knobs the manager, the scheduler and every
//! device consult: operation timeout, connection retry bound, reconnect pacing,
//! callback redispatch and the automatic steps of the connection pipeline.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use gattvisor::{BackoffPolicy, Config};
//!
//! let mut cfg = Config::default();
//! cfg.operation_timeout = Duration::from_secs(5);
//! cfg.connection_fail_retry_count = 0;
//! cfg.reconnect_backoff = BackoffPolicy::constant(Duration::from_secs(2));
//!
//! assert_eq!(cfg.operation_timeout_opt(), Some(Duration::from_secs(5)));
//! ```

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Configuration shared by the manager and all devices.
#[derive(Clone, Debug)]
pub struct Config {
    /// Executing-time limit for every operation (0 = no timeout).
    pub operation_timeout: Duration,
    /// Retry bound of the default connection-fail policy.
    pub connection_fail_retry_count: u32,
    /// Delay curve of the default reconnect policy.
    pub reconnect_backoff: BackoffPolicy,
    /// Reconnect attempts before giving up (0 = unlimited).
    pub reconnect_max_attempts: u32,
    /// Reconnect wall budget (0 = never give up).
    pub reconnect_give_up_after: Duration,
    /// Queue listener invocations for a [`CallbackPump`](crate::CallbackPump)
    /// instead of running them inline.
    pub post_callbacks: bool,
    /// Bond right after the native link comes up.
    pub auto_bond_after_connect: bool,
    /// Discover services right after the native link comes up.
    pub auto_get_services: bool,
    /// Remove the bond when the device disconnects.
    pub remove_bond_on_disconnect: bool,
    /// Remove any stale bond when the device is first discovered.
    pub remove_bond_on_discovery: bool,
    /// Use the native auto-connect flag for every connect.
    pub always_use_auto_connect: bool,
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
    /// Window of the read/write round-trip running averages.
    pub running_average_n: usize,
    /// Count firmware-update traffic in the running averages.
    pub include_firmware_update_times_in_average: bool,
}

impl Default for Config {
    /// - `operation_timeout = 12.5s`
    /// - `connection_fail_retry_count = 2`
    /// - `reconnect_backoff = BackoffPolicy::default()` (1s, ×2, 30s cap)
    /// - no reconnect attempt or time limit
    /// - `auto_get_services = true`, every other switch off
    /// - `bus_capacity = 1024`, `running_average_n = 10`
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_millis(12_500),
            connection_fail_retry_count: 2,
            reconnect_backoff: BackoffPolicy::default(),
            reconnect_max_attempts: 0,
            reconnect_give_up_after: Duration::ZERO,
            post_callbacks: false,
            auto_bond_after_connect: false,
            auto_get_services: true,
            remove_bond_on_disconnect: false,
            remove_bond_on_discovery: false,
            always_use_auto_connect: false,
            bus_capacity: 1024,
            running_average_n: 10,
            include_firmware_update_times_in_average: false,
        }
    }
}

impl Config {
    /// Operation timeout as an option (`None` when zero).
    pub fn operation_timeout_opt(&self) -> Option<Duration> {
        if self.operation_timeout.is_zero() {
            None
        } else {
            Some(self.operation_timeout)
        }
    }

    /// Reconnect budget as an option (`None` when zero).
    pub fn reconnect_give_up_after_opt(&self) -> Option<Duration> {
        if self.reconnect_give_up_after.is_zero() {
            None
        } else {
            Some(self.reconnect_give_up_after)
        }
    }

    /// Running-average window, never below one sample.
    pub fn running_average_window(&self) -> usize {
        self.running_average_n.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.operation_timeout_opt(), Some(Duration::from_millis(12_500)));
        assert_eq!(cfg.connection_fail_retry_count, 2);
        assert_eq!(cfg.reconnect_give_up_after_opt(), None);
        assert!(cfg.auto_get_services);
        assert!(!cfg.post_callbacks);
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let cfg = Config {
            operation_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert_eq!(cfg.operation_timeout_opt(), None);
    }

    #[test]
    fn test_average_window_floor() {
        let cfg = Config {
            running_average_n: 0,
            ..Config::default()
        };
        assert_eq!(cfg.running_average_window(), 1);
    }
}
