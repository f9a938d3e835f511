//! # The operation state machine.
//!
//! [`Operation`] owns its lifecycle. The scheduler drives it through four
//! entry points, and each one is a no-op once the operation is terminal:
//!
//! - `execute(radio)`: ARMED → EXECUTING, or straight to a terminal state when
//!   the native call is rejected or the work is already done
//! - `on_outcome(event, radio)`: the single delivery point for native callbacks
//! - `advance(elapsed)`: cooperative timekeeping; the only time-based transition
//! - `cancel(cause)`: soft cancellation, idempotent
//!
//! Kind-specific behavior is a `match` on [`OperationKind`]; there is no
//! per-kind type hierarchy.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use crate::coordinators::TxnId;
use crate::error::{CancelCause, OperationError};
use crate::native::{BondState, CCCD_UUID, GATT_SUCCESS, NativeEvent, NativeRadio};

use super::{GattTarget, OperationKind, OperationState, Priority, Target};

/// Global id counter.
static OPERATION_SEQ: AtomicU64 = AtomicU64::new(1);

/// Executing time after which a GATT-server response counts as delivered.
pub(crate) const RESPONSE_SETTLE_TIME: Duration = Duration::from_millis(500);

/// Process-unique operation identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
    fn next() -> Self {
        Self(OPERATION_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// One asynchronous unit of radio work.
#[derive(Debug)]
pub struct Operation {
    id: OperationId,
    target: Target,
    kind: OperationKind,
    priority: Option<Priority>,
    state: OperationState,
    explicit: bool,
    ordinal: u64,
    txn: Option<TxnId>,
    timeout: Option<Duration>,
    created_at: Instant,
    started_at: Option<Instant>,
    total_time: Duration,
    executing_time: Duration,
    error: Option<OperationError>,
    payload: Option<Vec<u8>>,
    gatt_target: GattTarget,
    cancelled_from: Option<OperationState>,
}

impl Operation {
    /// Creates a library-internal operation with the kind's default priority and no timeout.
    pub fn new(target: Target, kind: OperationKind) -> Self {
        Self {
            id: OperationId::next(),
            target,
            kind,
            priority: None,
            state: OperationState::Created,
            explicit: false,
            ordinal: 0,
            txn: None,
            timeout: None,
            created_at: Instant::now(),
            started_at: None,
            total_time: Duration::ZERO,
            executing_time: Duration::ZERO,
            error: None,
            payload: None,
            gatt_target: GattTarget::Characteristic,
            cancelled_from: None,
        }
    }

    /// Marks the operation as user-requested.
    pub fn with_explicit(mut self, explicit: bool) -> Self {
        self.explicit = explicit;
        self
    }

    /// Overrides the kind's default priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the timeout (`None` = wait forever).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Tags the operation as issued by a transaction.
    pub fn with_txn(mut self, txn: TxnId) -> Self {
        self.txn = Some(txn);
        self
    }

    #[inline]
    pub fn id(&self) -> OperationId {
        self.id
    }

    #[inline]
    pub fn target(&self) -> &Target {
        &self.target
    }

    #[inline]
    pub fn device(&self) -> Option<&crate::device::DeviceId> {
        self.target.device()
    }

    #[inline]
    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn priority(&self) -> Priority {
        self.priority
            .unwrap_or_else(|| self.kind.default_priority(self.explicit))
    }

    #[inline]
    pub fn state(&self) -> OperationState {
        self.state
    }

    #[inline]
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Insertion ordinal assigned by the scheduler.
    #[inline]
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    #[inline]
    pub fn txn(&self) -> Option<TxnId> {
        self.txn
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Time accumulated since submission.
    pub fn total_time(&self) -> Duration {
        self.total_time
    }

    /// Time accumulated while EXECUTING.
    pub fn executing_time(&self) -> Duration {
        self.executing_time
    }

    pub fn is_for_device(&self, device: &crate::device::DeviceId) -> bool {
        self.target.device() == Some(device)
    }

    /// Ordering rule used by the scheduler when inserting.
    ///
    /// A disconnect outranks any non-disconnect work for the same device;
    /// otherwise strictly higher priority wins and ties keep FIFO order.
    pub fn is_more_important_than(&self, other: &Operation) -> bool {
        if let (OperationKind::Disconnect, Some(dev)) = (&self.kind, self.device()) {
            if other.is_for_device(dev) && !matches!(other.kind, OperationKind::Disconnect) {
                return true;
            }
        }
        self.priority() > other.priority()
    }

    /// True if submitting `newcomer` makes this operation pointless.
    ///
    /// - a disconnect supersedes connects and connection-bound work for its device
    /// - an explicit connect supersedes a disconnect for its device that has not started yet
    pub fn is_superseded_by(&self, newcomer: &Operation) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        let Some(dev) = newcomer.device() else {
            return false;
        };
        if !self.is_for_device(dev) {
            return false;
        }
        match newcomer.kind {
            OperationKind::Disconnect => {
                matches!(self.kind, OperationKind::Connect { .. }) || self.kind.requires_connection()
            }
            OperationKind::Connect { .. } => {
                newcomer.explicit
                    && matches!(self.kind, OperationKind::Disconnect)
                    && self.state != OperationState::Executing
            }
            _ => false,
        }
    }

    pub(crate) fn enqueue(&mut self, ordinal: u64) {
        if self.state == OperationState::Created {
            self.ordinal = ordinal;
            self.state = OperationState::Queued;
        }
    }

    pub(crate) fn arm(&mut self) {
        if self.state == OperationState::Queued {
            self.state = OperationState::Armed;
        }
    }

    /// Issues the native call.
    ///
    /// Leaves the operation EXECUTING when the call was accepted, or terminal
    /// when it was rejected or turned out to be redundant.
    pub(crate) fn execute(&mut self, radio: &dyn NativeRadio) {
        if self.state != OperationState::Armed {
            return;
        }
        self.state = OperationState::Executing;
        self.started_at = Some(Instant::now());

        let kind = self.kind.clone();
        if let OperationKind::SendResponse { request } = &kind {
            if !radio.send_response(request) {
                self.fail(OperationError::FailedImmediately);
            }
            return;
        }

        let Some(dev) = self.target.device().cloned() else {
            self.fail(OperationError::FailedImmediately);
            return;
        };

        let accepted = match &kind {
            OperationKind::Connect { auto_connect } => {
                if radio.is_connected(&dev) {
                    self.succeed(None);
                    return;
                }
                radio.connect(&dev, *auto_connect)
            }
            OperationKind::Disconnect => {
                if !radio.is_connected(&dev) {
                    radio.close(&dev);
                    self.succeed(None);
                    return;
                }
                radio.disconnect(&dev)
            }
            OperationKind::Bond { .. } => {
                if radio.bond_state(&dev) == BondState::Bonded {
                    self.succeed(None);
                    return;
                }
                radio.bond(&dev)
            }
            OperationKind::Unbond => {
                if radio.bond_state(&dev) == BondState::None {
                    self.succeed(None);
                    return;
                }
                radio.unbond(&dev)
            }
            OperationKind::DiscoverServices => radio.discover_services(&dev),
            OperationKind::Read { uuid, .. } => radio.read(&dev, *uuid),
            OperationKind::Write { uuid, data } => radio.write(&dev, *uuid, data),
            OperationKind::ToggleNotify {
                uuid,
                enable,
                value,
            } => {
                if !radio.set_characteristic_notification(&dev, *uuid, *enable) {
                    self.fail(OperationError::FailedToToggleNotification);
                    return;
                }
                // Some stacks only need the local subscription.
                if !radio.has_descriptor(&dev, *uuid, CCCD_UUID) {
                    self.succeed(None);
                    return;
                }
                self.gatt_target = GattTarget::Descriptor;
                radio.write_descriptor(&dev, *uuid, CCCD_UUID, value)
            }
            OperationKind::SendResponse { .. } => return,
        };

        if !accepted {
            self.fail(OperationError::FailedImmediately);
        }
    }

    /// Feeds one native callback into the state machine.
    ///
    /// Returns `true` if the event belonged to this operation (including
    /// progress events that do not end it). Once terminal, always `false`.
    pub(crate) fn on_outcome(&mut self, event: &NativeEvent, radio: &dyn NativeRadio) -> bool {
        if self.state != OperationState::Executing {
            return false;
        }
        let kind = self.kind.clone();
        match (&kind, event) {
            (OperationKind::Connect { .. }, NativeEvent::Connected) => self.succeed(None),
            (
                OperationKind::Connect { .. },
                NativeEvent::ConnectFailed { status } | NativeEvent::Disconnected { status },
            ) => self.fail(OperationError::FailedEventually { status: *status }),

            (OperationKind::Disconnect, NativeEvent::Disconnected { .. }) => self.succeed(None),

            (OperationKind::Bond { .. }, NativeEvent::BondStateChanged { state, status }) => {
                match state {
                    BondState::Bonded => self.succeed(None),
                    BondState::Bonding => {}
                    BondState::None => {
                        self.fail(OperationError::FailedEventually { status: *status })
                    }
                }
            }
            (
                OperationKind::Unbond,
                NativeEvent::BondStateChanged {
                    state: BondState::None,
                    ..
                },
            ) => self.succeed(None),

            (OperationKind::DiscoverServices, NativeEvent::ServicesDiscovered { status }) => {
                self.settle(*status, None)
            }

            (
                OperationKind::Read { uuid, .. },
                NativeEvent::ReadComplete {
                    uuid: got,
                    status,
                    value,
                },
            ) if uuid == got => self.settle(*status, Some(value.clone())),

            (OperationKind::Write { uuid, .. }, NativeEvent::WriteComplete { uuid: got, status })
                if uuid == got =>
            {
                self.settle(*status, None)
            }

            (
                OperationKind::ToggleNotify { uuid, .. },
                NativeEvent::DescriptorWritten {
                    uuid: got,
                    descriptor,
                    status,
                },
            ) if uuid == got && *descriptor == CCCD_UUID => {
                let connected = self.target.device().is_some_and(|d| radio.is_connected(d));
                if *status == GATT_SUCCESS && connected {
                    self.succeed(None);
                } else if *status == GATT_SUCCESS {
                    self.fail(OperationError::Cancelled {
                        cause: CancelCause::Disconnect,
                    });
                } else {
                    self.fail(OperationError::FailedEventually { status: *status });
                }
            }

            _ => return false,
        }
        true
    }

    /// Advances the elapsed-time accumulators by one tick.
    ///
    /// Returns `true` if this tick ended the operation.
    pub(crate) fn advance(&mut self, elapsed: Duration) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.total_time += elapsed;
        if self.state != OperationState::Executing {
            return false;
        }
        self.executing_time += elapsed;

        if matches!(self.kind, OperationKind::SendResponse { .. })
            && self.executing_time >= RESPONSE_SETTLE_TIME
        {
            self.succeed(None);
            return true;
        }

        match self.timeout {
            Some(timeout) if self.executing_time >= timeout => {
                self.finish(
                    OperationState::TimedOut,
                    Some(OperationError::TimedOut { timeout }),
                    None,
                );
                true
            }
            _ => false,
        }
    }

    /// Soft-cancels the operation. Returns `false` if it was already terminal.
    pub(crate) fn cancel(&mut self, cause: CancelCause) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if matches!(self.kind, OperationKind::ToggleNotify { .. }) {
            self.gatt_target = if self.state == OperationState::Executing {
                GattTarget::Descriptor
            } else {
                GattTarget::Characteristic
            };
        }
        self.cancelled_from = Some(self.state);
        self.finish(
            OperationState::SoftlyCancelled,
            Some(OperationError::Cancelled { cause }),
            None,
        );
        true
    }

    fn settle(&mut self, status: i32, payload: Option<Vec<u8>>) {
        if status == GATT_SUCCESS {
            self.succeed(payload);
        } else {
            self.fail(OperationError::FailedEventually { status });
        }
    }

    fn succeed(&mut self, payload: Option<Vec<u8>>) {
        self.finish(OperationState::Succeeded, None, payload);
    }

    fn fail(&mut self, error: OperationError) {
        self.finish(OperationState::Failed, Some(error), None);
    }

    fn finish(
        &mut self,
        state: OperationState,
        error: Option<OperationError>,
        payload: Option<Vec<u8>>,
    ) {
        if self.state.is_terminal() {
            return;
        }
        self.state = state;
        self.error = error;
        self.payload = payload;
    }

    pub(crate) fn into_report(self) -> Report {
        let priority = self.priority();
        Report {
            id: self.id,
            target: self.target,
            kind: self.kind,
            state: self.state,
            priority,
            explicit: self.explicit,
            txn: self.txn,
            error: self.error,
            payload: self.payload,
            gatt_target: self.gatt_target,
            cancelled_from: self.cancelled_from,
            total_time: self.total_time,
            transit_time: self.executing_time,
        }
    }
}

/// Final record of an operation that left the scheduler.
#[derive(Debug, Clone)]
pub struct Report {
    pub id: OperationId,
    pub target: Target,
    pub kind: OperationKind,
    /// Always terminal.
    pub state: OperationState,
    pub priority: Priority,
    pub explicit: bool,
    pub txn: Option<TxnId>,
    pub error: Option<OperationError>,
    /// Value read, for successful reads.
    pub payload: Option<Vec<u8>>,
    pub gatt_target: GattTarget,
    /// State the operation was in when soft-cancelled.
    pub cancelled_from: Option<OperationState>,
    /// Submission to end.
    pub total_time: Duration,
    /// Time spent EXECUTING.
    pub transit_time: Duration,
}

impl Report {
    #[inline]
    pub fn succeeded(&self) -> bool {
        self.state == OperationState::Succeeded
    }

    #[inline]
    pub fn is_soft_cancel(&self) -> bool {
        self.state == OperationState::SoftlyCancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;
    use crate::native::fake::FakeRadio;
    use crate::operation::ReadKind;
    use uuid::Uuid;

    const CHAR: Uuid = Uuid::from_u128(0xaa);

    fn armed(kind: OperationKind) -> Operation {
        let mut op = Operation::new(Target::Device(DeviceId::from("dev")), kind)
            .with_timeout(Some(Duration::from_secs(2)));
        op.enqueue(1);
        op.arm();
        op
    }

    fn read() -> OperationKind {
        OperationKind::Read {
            uuid: CHAR,
            kind: ReadKind::Read,
        }
    }

    #[test]
    fn test_immediate_rejection_fails_synchronously() {
        let radio = FakeRadio::rejecting();
        let mut op = armed(read());
        op.execute(&radio);
        assert_eq!(op.state(), OperationState::Failed);
        assert_eq!(op.into_report().error, Some(OperationError::FailedImmediately));
    }

    #[test]
    fn test_eventual_failure_is_distinct() {
        let radio = FakeRadio::default();
        let mut op = armed(read());
        op.execute(&radio);
        assert_eq!(op.state(), OperationState::Executing);
        let ev = NativeEvent::ReadComplete {
            uuid: CHAR,
            status: 133,
            value: vec![],
        };
        assert!(op.on_outcome(&ev, &radio));
        assert_eq!(
            op.into_report().error,
            Some(OperationError::FailedEventually { status: 133 })
        );
    }

    #[test]
    fn test_callback_after_timeout_is_ignored() {
        let radio = FakeRadio::default();
        let mut op = armed(read());
        op.execute(&radio);
        assert!(!op.advance(Duration::from_secs(1)));
        assert!(op.advance(Duration::from_secs(1)));
        assert_eq!(op.state(), OperationState::TimedOut);

        let late = NativeEvent::ReadComplete {
            uuid: CHAR,
            status: GATT_SUCCESS,
            value: vec![1],
        };
        assert!(!op.on_outcome(&late, &radio));
        assert!(!op.cancel(CancelCause::Explicit));
        assert_eq!(op.state(), OperationState::TimedOut);
    }

    #[test]
    fn test_read_for_other_characteristic_does_not_match() {
        let radio = FakeRadio::default();
        let mut op = armed(read());
        op.execute(&radio);
        let other = NativeEvent::ReadComplete {
            uuid: Uuid::from_u128(0xbb),
            status: GATT_SUCCESS,
            value: vec![],
        };
        assert!(!op.on_outcome(&other, &radio));
        assert_eq!(op.state(), OperationState::Executing);
    }

    #[test]
    fn test_toggle_notify_cancel_target_depends_on_state() {
        let radio = FakeRadio::default();
        let kind = OperationKind::ToggleNotify {
            uuid: CHAR,
            enable: true,
            value: [1, 0],
        };

        let mut pending = armed(kind.clone());
        assert!(pending.cancel(CancelCause::Disconnect));
        assert_eq!(pending.into_report().gatt_target, GattTarget::Characteristic);

        let mut running = armed(kind);
        running.execute(&radio);
        assert!(running.cancel(CancelCause::Disconnect));
        let report = running.into_report();
        assert_eq!(report.gatt_target, GattTarget::Descriptor);
        assert_eq!(report.cancelled_from, Some(OperationState::Executing));
    }

    #[test]
    fn test_toggle_notify_without_descriptor_succeeds() {
        let radio = FakeRadio::default();
        radio.set_has_descriptor(false);
        let mut op = armed(OperationKind::ToggleNotify {
            uuid: CHAR,
            enable: true,
            value: [1, 0],
        });
        op.execute(&radio);
        assert_eq!(op.state(), OperationState::Succeeded);
    }

    #[test]
    fn test_send_response_settles_after_half_second() {
        let radio = FakeRadio::default();
        let mut op = Operation::new(
            Target::Manager,
            OperationKind::SendResponse {
                request: crate::native::ResponseRequest {
                    device: DeviceId::from("client"),
                    request_id: 7,
                    offset: 0,
                    status: GATT_SUCCESS,
                    data: vec![9],
                },
            },
        );
        op.enqueue(1);
        op.arm();
        op.execute(&radio);
        assert!(!op.advance(Duration::from_millis(300)));
        assert!(op.advance(Duration::from_millis(200)));
        assert_eq!(op.state(), OperationState::Succeeded);
    }

    #[test]
    fn test_disconnect_outranks_same_device_work() {
        let dev = DeviceId::from("dev");
        let disconnect = Operation::new(Target::Device(dev.clone()), OperationKind::Disconnect);
        let write = Operation::new(
            Target::Device(dev),
            OperationKind::Write {
                uuid: CHAR,
                data: vec![],
            },
        )
        .with_priority(Priority::ForPriorityReadsWrites);
        let foreign = Operation::new(
            Target::Device(DeviceId::from("other")),
            OperationKind::Write {
                uuid: CHAR,
                data: vec![],
            },
        )
        .with_priority(Priority::Critical);

        assert!(disconnect.is_more_important_than(&write));
        assert!(!disconnect.is_more_important_than(&foreign));
        assert!(write.is_superseded_by(&disconnect));
        assert!(!foreign.is_superseded_by(&disconnect));
    }

    #[test]
    fn test_only_explicit_connect_supersedes_queued_disconnect() {
        let dev = DeviceId::from("dev");
        let mut disconnect = Operation::new(Target::Device(dev.clone()), OperationKind::Disconnect);
        disconnect.enqueue(0);
        let connect = |explicit| {
            Operation::new(
                Target::Device(dev.clone()),
                OperationKind::Connect {
                    auto_connect: false,
                },
            )
            .with_explicit(explicit)
        };
        assert!(!disconnect.is_superseded_by(&connect(false)));
        assert!(disconnect.is_superseded_by(&connect(true)));
    }
}
