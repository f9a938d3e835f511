//! # Per-device coordinators.
//!
//! Each device record owns one instance of every coordinator. They are plain
//! state machines: they never lock, never touch the radio and never call
//! listeners. The device feeds them inputs under its own lock and acts on what
//! they return (submit an operation, apply a state cluster, publish an event).
//!
//! ```text
//!                  ┌──────────────────────────┐
//!  connect fails ─►│ ConnectionFailCoordinator│─► Verdict { please, authoritative }
//!                  └────────────▲─────────────┘
//!                               │ ConnectMode
//!                  ┌────────────┴─────────────┐
//!  rogue drop    ─►│   ReconnectCoordinator   │─► ReconnectStep::Attempt(n)
//!  update(dt)    ─►│                          │
//!                  └──────────────────────────┘
//!  update(dt)    ─► PollCoordinator        ─► PollRead { uuid, kind }
//!  start(txn)    ─► TransactionCoordinator ─► TxnSignal::{Request, Ended}
//! ```
//!
//! ## Rules
//! - While the reconnect loop runs the mode is [`ConnectMode::Reconnecting`]:
//!   connection-fail verdicts are still computed and published but only the
//!   reconnect policy decides whether another attempt is made.
//! - Policies and transactions are invoked while the device lock is held and
//!   must not call back into the device.

mod connection_fail;
mod poll;
mod reconnect;
mod transaction;

pub use connection_fail::{ConnectionFailCoordinator, Verdict};
pub use poll::{NotifyState, PollCoordinator, PollRead};
pub use reconnect::{ReconnectCoordinator, ReconnectStep};
pub use transaction::{
    TransactionCoordinator, Transaction, TxnContext, TxnFactory, TxnId, TxnKind, TxnRequest,
    TxnSignal,
};

/// Whose retry decision is honored for a failed connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectMode {
    /// The connection-fail policy decides.
    Direct,
    /// The reconnect policy decides; connection-fail verdicts are observational.
    Reconnecting,
}

impl ConnectMode {
    pub fn as_label(&self) -> &'static str {
        match self {
            ConnectMode::Direct => "direct",
            ConnectMode::Reconnecting => "reconnecting",
        }
    }
}
