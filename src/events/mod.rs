//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the scheduler, devices,
//! coordinators and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Scheduler` (operation lifecycle), `Device` (state changes,
//!   connection failures, reconnect, transactions, polls), `Manager` (radio state,
//!   discovery, diagnostics), `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the manager's subscriber listener (fans out to
//!   `SubscriberSet`) and any receiver from [`Manager::subscribe`](crate::Manager::subscribe).
//!
//! Publishing never needs a runtime; only subscriber workers do.

mod bus;
mod event;

pub use bus::{Bus, WeakBus};
pub use event::{Event, EventKind};
