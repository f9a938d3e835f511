//! Connection retry and reconnect policies.
//!
//! ## Contents
//! - [`ConnectionFailPolicy`] verdict on a failed connection attempt (retry / give up)
//! - [`ReconnectPolicy`] pacing of the reconnect loop after a rogue disconnect
//! - [`BackoffPolicy`] delay curve used by the stock reconnect policy
//! - [`JitterPolicy`] randomization applied to backoff delays
//!
//! ## Quick wiring
//! ```text
//! ManagerBuilder
//!   ├─ with_connection_fail_policy(P) ─► ConnectionFailCoordinator (per device)
//!   └─ with_reconnect_policy(R)       ─► ReconnectCoordinator      (per device)
//! ```
//!
//! ## Defaults
//! - `DefaultConnectionFailPolicy { retry_count: Config::connection_fail_retry_count }`.
//! - `BackoffReconnectPolicy::from_config`: first=1s, factor=2.0, max=30s, no jitter, unlimited.

mod backoff;
mod connection_fail;
mod jitter;
mod reconnect;

pub use backoff::BackoffPolicy;
pub use connection_fail::{
    ConnectionFailEvent, ConnectionFailPolicy, ConnectionFailReason, DefaultConnectionFailPolicy,
    Please,
};
pub use jitter::JitterPolicy;
pub use reconnect::{BackoffReconnectPolicy, ReconnectContext, ReconnectDecision, ReconnectPolicy};
