//! # Scheduler: serialized execution of radio operations.
//!
//! One [`Scheduler`] exists per radio. It exclusively owns every pending and
//! executing [`Operation`](crate::operation::Operation); devices only submit
//! and later receive a [`Report`](crate::operation::Report).
//!
//! ## Architecture
//! ```text
//! submit(op) ──► supersession: soft-cancel ops made pointless by `op`
//!            └─► pending (priority desc, ordinal asc)
//!
//!                 ┌──────────────── pump(radio) ────────────────┐
//!                 │ current empty?                              │
//!                 │   └─► first pending not held by a txn lock  │
//!                 │         ARMED ─► execute() ─► EXECUTING     │
//!                 │                      │                      │
//!                 │                      └─ terminal at once ─► report, repeat
//!                 └─────────────────────────────────────────────┘
//!
//! tick(elapsed)      ─► advance timers ─► TIMED_OUT? ─► report ─► pump
//! deliver(dev, ev)   ─► current.on_outcome(ev) ─► terminal? ─► report ─► pump
//! cancel(pred, why)  ─► SOFTLY_CANCELLED for every match, no native call
//! ```
//!
//! ## Rules
//! - At most one operation is EXECUTING at any instant.
//! - Priority ties break by insertion ordinal (FIFO).
//! - A transaction lock on a device holds back that device's reads, writes and
//!   notification toggles that do not belong to the lock holder.
//! - Terminal operations leave the scheduler immediately; their reports wait in
//!   an outbox until [`Scheduler::drain_reports`] is called.
//! - Cancelling something already gone is a no-op.

mod queue;

pub use queue::{Delivery, OperationView, Scheduler, SchedulerSnapshot};
