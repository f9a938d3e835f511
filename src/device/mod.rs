//! # Device records.
//!
//! A [`Device`] is created by discovery and lives until it is undiscovered. It
//! owns its [`StateTracker`](crate::StateTracker) and one instance of every
//! coordinator, all behind a single per-device lock.
//!
//! ## Connection pipeline
//! ```text
//! connect() ─► Connect op ─► link up ─┬─► (auto) Bond op
//!                                     └─► DiscoverServices op
//!                                            └─► authentication txn
//!                                                   └─► initialization txn
//!                                                          └─► INITIALIZED
//!                                                                ├─ reset failure count
//!                                                                ├─ stop reconnect loop
//!                                                                └─ enable pending notifications
//!
//! any stage fails ─► ConnectionFailCoordinator ─► Retry ─► connect again
//!                                              └► DoNotRetry ─► disconnected cluster
//!
//! rogue drop of an INITIALIZED device ─► ReconnectCoordinator loop
//! ```
//!
//! ## Rules
//! - Every public method takes the device lock, then (if needed) the
//!   scheduler lock; never the other way round.
//! - Listeners are never called with a lock held. Their invocations are queued
//!   and run in order once the triggering call has released its locks.
//! - Read, write and notify requests fail early with
//!   [`ReadWriteStatus::NotConnected`] or [`ReadWriteStatus::NoMatchingTarget`]
//!   without touching the scheduler.

#[allow(clippy::module_inception)]
mod device;
mod id;
mod pipeline;
mod result;
mod timing;

pub use device::Device;
pub use id::DeviceId;
pub use result::{ReadWriteKind, ReadWriteListener, ReadWriteResult, ReadWriteStatus};
