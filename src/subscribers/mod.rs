//! # Event subscribers.
//!
//! Subscribers observe the [`Bus`](crate::events::Bus) without slowing down the
//! scheduler or the devices. The manager forwards every bus event to a
//! [`SubscriberSet`], which queues it per subscriber.
//!
//! ```text
//!   Scheduler / Device / Manager ── publish(Event) ──► Bus
//!                                                      │
//!                                   subscriber_listener (Manager)
//!                                                      │
//!                                                      ▼
//!                                               SubscriberSet::emit
//!                                      ┌───────────────┼───────────────┐
//!                                      ▼               ▼               ▼
//!                                  LogWriter        Metrics          Custom
//! ```
//!
//! ## Contents
//! - [`Subscribe`] the extension trait
//! - [`SubscriberSet`] per-subscriber bounded fan-out
//! - [`LogWriter`] built-in `tracing` renderer (feature `logging`)

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
