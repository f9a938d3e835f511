//! # gattvisor
//!
//! **Gattvisor** coordinates asynchronous operations against Bluetooth Low
//! Energy peripherals.
//!
//! A BLE radio exposes a narrow, callback-driven native interface where only
//! one operation may be outstanding at a time and completions arrive late,
//! fail, or never arrive. Gattvisor serializes that work through a priority
//! scheduler, tracks each device's overlapping conditions as a bitmask, and
//! recovers from failed connections and dropped links according to pluggable
//! policies. The native stack itself stays outside: the crate drives it
//! through the [`NativeRadio`] trait and is fed its callbacks.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   application                                   native stack
//!   ───────────                                   ────────────
//!   device.connect() / read() / ...                 NativeRadio (impl)
//!        │                                                ▲   │ callbacks
//!        ▼                                                │   ▼
//! ┌───────────────────────────────────────────────────────┴──────────────┐
//! │  Manager                                                             │
//! │  - Scheduler (one per radio: priority + FIFO, one EXECUTING op)      │
//! │  - Device registry                                                   │
//! │      Device = StateTracker<DeviceState>                              │
//! │             + ConnectionFailCoordinator + ReconnectCoordinator       │
//! │             + PollCoordinator + TransactionCoordinator               │
//! │  - StateTracker<ManagerState> (radio power, scanning)                │
//! └──────┬────────────────────────────┬─────────────────────────────┬────┘
//!        │ listeners                  │ publish(Event)              │ tick(dt)
//!        ▼                            ▼                             │
//!   state / read-write /        Bus (broadcast) ──► SubscriberSet   spawn_ticker
//!   response listeners          (capacity: Config::bus_capacity)    or caller
//!   (inline or CallbackPump)          └─► Manager::subscribe()
//! ```
//!
//! ### Operation lifecycle
//! ```text
//! submit ─► QUEUED ─► ARMED ─► EXECUTING ─┬─► SUCCEEDED
//!              │        │          │      ├─► FAILED      (immediate or eventual)
//!              │        │          │      └─► TIMED_OUT   (only on tick)
//!              └────────┴──────────┴────────► SOFTLY_CANCELLED (disconnect, radio off, ...)
//! ```
//!
//! ### Connection recovery
//! ```text
//! connect attempt fails
//!   ├─ mode Direct:       ConnectionFailPolicy ─► Retry ─► connect again
//!   │                                          └► DoNotRetry ─► DISCONNECTED
//!   └─ mode Reconnecting: verdict published only; ReconnectPolicy paces the next attempt
//!
//! INITIALIZED device drops unexpectedly ─► reconnect loop (mode Reconnecting)
//!   until: INITIALIZED again | explicit connect/disconnect | policy exhausted
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                              |
//! |-------------------|--------------------------------------------------------------|-------------------------------------------------|
//! | **Scheduling**    | Priority/FIFO serialization of radio work with timeouts.     | [`Scheduler`], [`Operation`], [`Priority`]      |
//! | **State**         | Overlapping device and radio conditions as bitmasks.         | [`StateTracker`], [`DeviceState`], [`ManagerState`] |
//! | **Recovery**      | Retry verdicts and the reconnect loop.                       | [`ConnectionFailPolicy`], [`ReconnectPolicy`]   |
//! | **Traffic**       | Reads, writes, notifications, polls, transactions.           | [`Device`], [`ReadWriteResult`], [`Transaction`] |
//! | **Subscriber API**| Hook into scheduler and device events.                       | [`Subscribe`], [`Event`]                        |
//! | **Errors**        | Typed operation and manager errors.                          | [`OperationError`], [`ManagerError`]            |
//! | **Configuration** | Centralized knobs.                                           | [`Config`]                                      |
//!
//! ## Optional features
//! - `logging`: exports [`LogWriter`], which renders bus events as `tracing` records.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use gattvisor::{
//!     BondState, Characteristic, Config, DeviceId, DeviceState, ManagerBuilder, NativeEvent,
//!     NativeRadio, ResponseRequest,
//! };
//! use uuid::Uuid;
//!
//! // A radio that accepts everything; callbacks are fed by hand below.
//! struct Accepting;
//!
//! impl NativeRadio for Accepting {
//!     fn connect(&self, _: &DeviceId, _: bool) -> bool { true }
//!     fn disconnect(&self, _: &DeviceId) -> bool { true }
//!     fn close(&self, _: &DeviceId) {}
//!     fn is_connected(&self, _: &DeviceId) -> bool { false }
//!     fn discover_services(&self, _: &DeviceId) -> bool { true }
//!     fn characteristics(&self, _: &DeviceId) -> Vec<Characteristic> { Vec::new() }
//!     fn read(&self, _: &DeviceId, _: Uuid) -> bool { true }
//!     fn write(&self, _: &DeviceId, _: Uuid, _: &[u8]) -> bool { true }
//!     fn set_characteristic_notification(&self, _: &DeviceId, _: Uuid, _: bool) -> bool { true }
//!     fn has_descriptor(&self, _: &DeviceId, _: Uuid, _: Uuid) -> bool { false }
//!     fn write_descriptor(&self, _: &DeviceId, _: Uuid, _: Uuid, _: &[u8]) -> bool { true }
//!     fn bond(&self, _: &DeviceId) -> bool { true }
//!     fn unbond(&self, _: &DeviceId) -> bool { true }
//!     fn bond_state(&self, _: &DeviceId) -> BondState { BondState::None }
//!     fn send_response(&self, _: &ResponseRequest) -> bool { true }
//! }
//!
//! let manager = ManagerBuilder::new(Config::default(), Arc::new(Accepting)).build()?;
//! let device = manager.discover("AA:BB:CC:DD:EE:FF");
//!
//! device.connect();
//! assert!(device.is(DeviceState::Connecting));
//!
//! manager.on_native_event(device.id(), NativeEvent::Connected);
//! manager.on_native_event(device.id(), NativeEvent::ServicesDiscovered { status: 0 });
//! assert!(device.is(DeviceState::Initialized));
//!
//! manager.tick(Duration::from_millis(50));
//! # Ok::<(), gattvisor::ManagerError>(())
//! ```

mod config;
mod coordinators;
mod device;
mod error;
mod events;
mod manager;
mod native;
mod operation;
mod policies;
mod scheduler;
mod state;
mod subscribers;

// ---- Public re-exports ----

pub use config::Config;
pub use coordinators::{
    ConnectMode, ConnectionFailCoordinator, NotifyState, PollCoordinator, PollRead,
    ReconnectCoordinator, ReconnectStep, Transaction, TransactionCoordinator, TxnContext,
    TxnFactory, TxnId, TxnKind, TxnRequest, TxnSignal, Verdict,
};
pub use device::{Device, DeviceId, ReadWriteKind, ReadWriteListener, ReadWriteResult, ReadWriteStatus};
pub use error::{CancelCause, ManagerError, OperationError};
pub use events::{Bus, Event, EventKind, WeakBus};
pub use manager::{CallbackPump, Manager, ManagerBuilder, ResponseListener};
pub use native::{
    BondState, CCCD_UUID, CharProperty, Characteristic, DISABLE_NOTIFICATION_VALUE,
    ENABLE_INDICATION_VALUE, ENABLE_NOTIFICATION_VALUE, GATT_SUCCESS, NativeEvent, NativeRadio,
    ResponseRequest,
};
pub use operation::{
    GattTarget, Operation, OperationId, OperationKind, OperationState, Priority, ReadKind, Report,
    Target,
};
pub use policies::{
    BackoffPolicy, BackoffReconnectPolicy, ConnectionFailEvent, ConnectionFailPolicy,
    ConnectionFailReason, DefaultConnectionFailPolicy, JitterPolicy, Please, ReconnectContext,
    ReconnectDecision, ReconnectPolicy,
};
pub use scheduler::{Delivery, OperationView, Scheduler, SchedulerSnapshot};
pub use state::{DeviceState, ManagerState, State, StateChange, StateListener, StateTracker, describe};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: a tracing-backed subscriber for bus events.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
