//! Radio operations and their lifecycle.
//!
//! An [`Operation`] is one asynchronous unit of radio work. The concrete work
//! is a closed set of variants ([`OperationKind`]); all variants share one
//! lifecycle ([`OperationState`]) and are dispatched by pattern matching.
//!
//! ## Lifecycle
//! ```text
//! CREATED ──submit──► QUEUED ──promote──► ARMED ──execute()──► EXECUTING
//!    │                  │                   │                     │
//!    │                  │                   │      ┌──────────────┼───────────────┐
//!    │                  │                   │      ▼              ▼               ▼
//!    │                  │                   │  SUCCEEDED        FAILED        TIMED_OUT
//!    │                  │                   │  (callback)   (immediate or    (tick-driven)
//!    │                  │                   │                eventual)
//!    └──────────────────┴───────────────────┴──────────► SOFTLY_CANCELLED (any non-terminal)
//! ```
//!
//! ## Rules
//! - Terminal states are final; late callbacks are ignored.
//! - Immediate native rejection and eventual native failure are both `FAILED`
//!   but carry different [`OperationError`](crate::OperationError) values.
//! - Soft cancellation never issues a native call.

mod kind;
mod operation;
mod priority;
mod state;

pub use kind::{GattTarget, OperationKind, ReadKind, Target};
pub use operation::{Operation, OperationId, Report};
pub use priority::Priority;
pub use state::OperationState;
