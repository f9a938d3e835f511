//! # Events emitted by the scheduler, devices and coordinators.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Operation events**: scheduler lifecycle (queued, executing, terminal states)
//! - **State events**: device and radio mask changes, discovery
//! - **Coordination events**: connection failures, reconnect loop, transactions, polls
//! - **Infrastructure events**: diagnostics, subscriber overflow/panic
//!
//! The [`Event`] struct carries metadata such as timestamps, device id,
//! operation id, reasons, masks and delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use gattvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::OperationTimedOut)
//!     .with_device("AA:BB:CC:DD:EE:FF")
//!     .with_label("connect")
//!     .with_timeout(Duration::from_secs(12));
//!
//! assert_eq!(ev.kind, EventKind::OperationTimedOut);
//! assert_eq!(ev.device.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
//! assert_eq!(ev.timeout_ms, Some(12_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use uuid::Uuid;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `label`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `label`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Operation lifecycle ===
    /// Operation entered the pending set.
    ///
    /// Sets:
    /// - `device`: target device (absent for manager operations)
    /// - `operation`: operation id
    /// - `label`: operation kind
    /// - `reason`: priority label
    OperationQueued,

    /// Native call issued; awaiting its callback.
    ///
    /// Sets: `device`, `operation`, `label`
    OperationExecuting,

    /// Sets: `device`, `operation`, `label`, `delay_ms` (transit time)
    OperationSucceeded,

    /// Native rejection or eventual failure.
    ///
    /// Sets: `device`, `operation`, `label`, `reason` (error label)
    OperationFailed,

    /// No native callback within the timeout.
    ///
    /// Sets: `device`, `operation`, `label`, `timeout_ms`
    OperationTimedOut,

    /// Pre-empted by a lifecycle event.
    ///
    /// Sets: `device`, `operation`, `label`, `reason` (cancel cause)
    OperationCancelled,

    // === State ===
    /// A device state mask changed.
    ///
    /// Sets: `device`, `old_mask`, `new_mask`
    DeviceStateChanged,

    /// The radio manager state mask changed.
    ///
    /// Sets: `old_mask`, `new_mask`
    RadioStateChanged,

    /// Sets: `device`
    DeviceDiscovered,

    /// Sets: `device`
    DeviceRediscovered,

    /// Sets: `device`
    DeviceUndiscovered,

    // === Coordination ===
    /// A connection attempt failed.
    ///
    /// Sets:
    /// - `device`
    /// - `reason`: failure reason label
    /// - `attempt`: consecutive failure count
    /// - `label`: verdict (`retry`, `do_not_retry`, `deferred_to_reconnect`)
    ConnectionFailed,

    /// Reconnect loop started after an unexpected disconnect.
    ///
    /// Sets: `device`, `delay_ms` (wait before the first attempt)
    ReconnectStarted,

    /// Reconnect loop issued a connect.
    ///
    /// Sets: `device`, `attempt`, `delay_ms` (wait before the next attempt, if any)
    ReconnectAttempt,

    /// Reconnect loop stopped.
    ///
    /// Sets: `device`, `reason` (`connected`, `explicit`, `gave_up`, ...)
    ReconnectStopped,

    /// Sets: `device`, `label` (transaction kind)
    TransactionStarted,

    /// Sets: `device`, `label` (transaction kind), `reason` (`succeeded`, `failed`, `cancelled`)
    TransactionEnded,

    /// A poll read was submitted.
    ///
    /// Sets: `device`, `uuid`, `label` (`poll` or `pseudo_notification`)
    PollReadScheduled,

    /// A pushed value arrived.
    ///
    /// Sets: `device`, `uuid`
    NotificationReceived,

    // === Diagnostics ===
    /// An internal inconsistency was detected and recovered from.
    ///
    /// Sets: `device` (if applicable), `reason`
    Diagnostic,
}

impl EventKind {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::SubscriberPanicked => "subscriber_panicked",
            EventKind::SubscriberOverflow => "subscriber_overflow",
            EventKind::OperationQueued => "operation_queued",
            EventKind::OperationExecuting => "operation_executing",
            EventKind::OperationSucceeded => "operation_succeeded",
            EventKind::OperationFailed => "operation_failed",
            EventKind::OperationTimedOut => "operation_timed_out",
            EventKind::OperationCancelled => "operation_cancelled",
            EventKind::DeviceStateChanged => "device_state_changed",
            EventKind::RadioStateChanged => "radio_state_changed",
            EventKind::DeviceDiscovered => "device_discovered",
            EventKind::DeviceRediscovered => "device_rediscovered",
            EventKind::DeviceUndiscovered => "device_undiscovered",
            EventKind::ConnectionFailed => "connection_failed",
            EventKind::ReconnectStarted => "reconnect_started",
            EventKind::ReconnectAttempt => "reconnect_attempt",
            EventKind::ReconnectStopped => "reconnect_stopped",
            EventKind::TransactionStarted => "transaction_started",
            EventKind::TransactionEnded => "transaction_ended",
            EventKind::PollReadScheduled => "poll_read_scheduled",
            EventKind::NotificationReceived => "notification_received",
            EventKind::Diagnostic => "diagnostic",
        }
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Device id, if applicable.
    pub device: Option<Arc<str>>,
    /// Operation id, if applicable.
    pub operation: Option<u64>,
    /// Short stable label (operation kind, subscriber name, verdict...).
    pub label: Option<&'static str>,
    /// Human-readable reason (errors, causes, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Attempt or failure count.
    pub attempt: Option<u32>,
    /// Characteristic, if applicable.
    pub uuid: Option<Uuid>,
    /// Timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Delay or elapsed time in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// State mask before a change.
    pub old_mask: Option<u32>,
    /// State mask after a change.
    pub new_mask: Option<u32>,
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            device: None,
            operation: None,
            label: None,
            reason: None,
            attempt: None,
            uuid: None,
            timeout_ms: None,
            delay_ms: None,
            old_mask: None,
            new_mask: None,
        }
    }

    #[inline]
    pub fn with_device(mut self, device: impl Into<Arc<str>>) -> Self {
        self.device = Some(device.into());
        self
    }

    #[inline]
    pub fn with_operation(mut self, id: u64) -> Self {
        self.operation = Some(id);
        self
    }

    #[inline]
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    #[inline]
    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    #[inline]
    pub fn with_masks(mut self, old: u32, new: u32) -> Self {
        self.old_mask = Some(old);
        self.new_mask = Some(new);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_label(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_label(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_operation_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::OperationSucceeded
                | EventKind::OperationFailed
                | EventKind::OperationTimedOut
                | EventKind::OperationCancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::Diagnostic);
        let b = Event::new(EventKind::Diagnostic);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_delay_is_clamped() {
        let ev = Event::new(EventKind::ReconnectAttempt).with_delay(Duration::from_secs(u64::MAX));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }
}
