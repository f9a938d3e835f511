//! # Verdicts on failed connection attempts.
//!
//! Every failed attempt on the way to a fully initialized connection produces a
//! [`ConnectionFailEvent`]. The device's connection-fail coordinator hands it to
//! a [`ConnectionFailPolicy`], which answers [`Please::Retry`] or
//! [`Please::DoNotRetry`].
//!
//! ```text
//! attempt failed ─► ConnectionFailEvent { reason, failure_count, mode }
//!                        │
//!                        ▼
//!               policy.on_event(&ev) ─► Please
//!                        │
//!        mode == Direct ─┴─► honored (re-issue connect or give up)
//!        mode == Reconnecting ─► observed only; reconnect policy decides
//! ```
//!
//! Any `Fn(&ConnectionFailEvent) -> Please` closure is a policy.

use std::fmt;

use crate::coordinators::ConnectMode;
use crate::device::DeviceId;

/// Answer of a [`ConnectionFailPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Please {
    Retry,
    DoNotRetry,
}

impl Please {
    pub fn is_retry(self) -> bool {
        matches!(self, Please::Retry)
    }
}

/// Stage of the connection pipeline that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionFailReason {
    /// The native connect call was rejected or reported a failure status.
    NativeConnectionFailed,
    /// The native connect never called back.
    NativeConnectionTimedOut,
    /// Service discovery failed after the link came up.
    GettingServicesFailed,
    /// The authentication transaction failed.
    AuthenticationFailed,
    /// The initialization transaction failed.
    InitializationFailed,
    /// The link dropped before the device was fully initialized.
    RogueDisconnect,
    /// The user disconnected while the connection was in progress.
    ExplicitlyCancelled,
}

impl ConnectionFailReason {
    pub fn as_label(&self) -> &'static str {
        match self {
            ConnectionFailReason::NativeConnectionFailed => "native_connection_failed",
            ConnectionFailReason::NativeConnectionTimedOut => "native_connection_timed_out",
            ConnectionFailReason::GettingServicesFailed => "getting_services_failed",
            ConnectionFailReason::AuthenticationFailed => "authentication_failed",
            ConnectionFailReason::InitializationFailed => "initialization_failed",
            ConnectionFailReason::RogueDisconnect => "rogue_disconnect",
            ConnectionFailReason::ExplicitlyCancelled => "explicitly_cancelled",
        }
    }

    /// True for failures that happened after the native link came up.
    pub fn was_connected(&self) -> bool {
        matches!(
            self,
            ConnectionFailReason::GettingServicesFailed
                | ConnectionFailReason::AuthenticationFailed
                | ConnectionFailReason::InitializationFailed
                | ConnectionFailReason::RogueDisconnect
        )
    }
}

impl fmt::Display for ConnectionFailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Input to a [`ConnectionFailPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionFailEvent {
    pub device: DeviceId,
    pub reason: ConnectionFailReason,
    /// Consecutive failures counted so far, including this one.
    ///
    /// Not incremented while reconnecting or for explicit cancellation.
    pub failure_count: u32,
    /// Native status code when the failure came from a callback.
    pub status: Option<i32>,
    /// Whose verdict counts for this failure.
    pub mode: ConnectMode,
}

/// Decides whether a failed connection attempt is retried.
pub trait ConnectionFailPolicy: Send + Sync + 'static {
    fn on_event(&self, event: &ConnectionFailEvent) -> Please;
}

impl<F> ConnectionFailPolicy for F
where
    F: Fn(&ConnectionFailEvent) -> Please + Send + Sync + 'static,
{
    fn on_event(&self, event: &ConnectionFailEvent) -> Please {
        self(event)
    }
}

/// Retries while `failure_count <= retry_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultConnectionFailPolicy {
    pub retry_count: u32,
}

impl DefaultConnectionFailPolicy {
    pub fn new(retry_count: u32) -> Self {
        Self { retry_count }
    }
}

impl Default for DefaultConnectionFailPolicy {
    fn default() -> Self {
        Self { retry_count: 2 }
    }
}

impl ConnectionFailPolicy for DefaultConnectionFailPolicy {
    fn on_event(&self, event: &ConnectionFailEvent) -> Please {
        if event.failure_count <= self.retry_count {
            Please::Retry
        } else {
            Please::DoNotRetry
        }
    }
}
