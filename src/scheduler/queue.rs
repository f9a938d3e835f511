use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::coordinators::TxnId;
use crate::device::DeviceId;
use crate::error::CancelCause;
use crate::events::{Bus, Event, EventKind};
use crate::native::{NativeEvent, NativeRadio};
use crate::operation::{
    Operation, OperationId, OperationKind, OperationState, Priority, Report, Target,
};

/// What happened to a native callback handed to [`Scheduler::deliver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// No executing operation claimed it (stale, spurious or unsolicited).
    Unmatched,
    /// The executing operation consumed it.
    Consumed {
        id: OperationId,
        kind: OperationKind,
        explicit: bool,
    },
}

/// Read-only view of a scheduled operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationView {
    pub id: OperationId,
    pub target: Target,
    pub kind: OperationKind,
    pub state: OperationState,
    pub priority: Priority,
    pub explicit: bool,
    pub ordinal: u64,
}

impl From<&Operation> for OperationView {
    fn from(op: &Operation) -> Self {
        Self {
            id: op.id(),
            target: op.target().clone(),
            kind: op.kind().clone(),
            state: op.state(),
            priority: op.priority(),
            explicit: op.is_explicit(),
            ordinal: op.ordinal(),
        }
    }
}

/// Point-in-time copy of the scheduler contents.
#[derive(Debug, Clone, Default)]
pub struct SchedulerSnapshot {
    pub current: Option<OperationView>,
    /// In execution order.
    pub pending: Vec<OperationView>,
}

impl SchedulerSnapshot {
    /// Current first, then pending.
    pub fn iter(&self) -> impl Iterator<Item = &OperationView> {
        self.current.iter().chain(self.pending.iter())
    }

    pub fn len(&self) -> usize {
        self.pending.len() + usize::from(self.current.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Priority queue plus the single execution slot of one radio.
pub struct Scheduler {
    pending: Vec<Operation>,
    current: Option<Operation>,
    next_ordinal: u64,
    locks: HashMap<DeviceId, TxnId>,
    finished: Vec<Report>,
    bus: Bus,
}

impl Scheduler {
    pub fn new(bus: Bus) -> Self {
        Self {
            pending: Vec::new(),
            current: None,
            next_ordinal: 0,
            locks: HashMap::new(),
            finished: Vec::new(),
            bus,
        }
    }

    /// Inserts an operation into the pending set and returns its id.
    ///
    /// Operations the newcomer supersedes are soft-cancelled first. Nothing
    /// executes until the next [`pump`](Self::pump) or [`tick`](Self::tick).
    pub fn submit(&mut self, mut op: Operation) -> OperationId {
        let superseded = self.cancel(|existing| existing.is_superseded_by(&op), CancelCause::Superseded);
        if superseded > 0 {
            debug!(op = %op.id(), kind = op.kind().as_label(), superseded, "newcomer superseded queued work");
        }

        op.enqueue(self.next_ordinal);
        self.next_ordinal += 1;

        let mut ev = Event::new(EventKind::OperationQueued)
            .with_operation(op.id().get())
            .with_label(op.kind().as_label())
            .with_reason(op.priority().as_label());
        if let Some(dev) = op.device() {
            ev = ev.with_device(dev.as_arc());
        }
        self.bus.publish(ev);
        trace!(op = %op.id(), kind = op.kind().as_label(), priority = op.priority().as_label(), "queued");

        let id = op.id();
        let at = self
            .pending
            .iter()
            .position(|queued| op.is_more_important_than(queued))
            .unwrap_or(self.pending.len());
        self.pending.insert(at, op);
        id
    }

    /// Promotes pending work into the execution slot while it is free.
    ///
    /// Operations that end synchronously (rejected or redundant) are reported
    /// and the next candidate is tried right away.
    pub fn pump(&mut self, radio: &dyn NativeRadio) {
        while self.current.is_none() {
            let Some(at) = self.pending.iter().position(|op| !self.is_held(op)) else {
                return;
            };
            let mut op = self.pending.remove(at);
            op.arm();
            op.execute(radio);

            if op.state().is_terminal() {
                self.finish(op);
                continue;
            }

            let mut ev = Event::new(EventKind::OperationExecuting)
                .with_operation(op.id().get())
                .with_label(op.kind().as_label());
            if let Some(dev) = op.device() {
                ev = ev.with_device(dev.as_arc());
            }
            self.bus.publish(ev);
            debug!(op = %op.id(), kind = op.kind().as_label(), "executing");
            self.current = Some(op);
        }
    }

    /// Advances time by `elapsed`, applies timeouts, then pumps.
    ///
    /// This is the only place time-based transitions happen.
    pub fn tick(&mut self, elapsed: Duration, radio: &dyn NativeRadio) {
        for op in &mut self.pending {
            op.advance(elapsed);
        }

        let ended = self.current.as_mut().is_some_and(|op| op.advance(elapsed));
        if ended {
            if let Some(op) = self.current.take() {
                if op.state() == OperationState::TimedOut {
                    if let (OperationKind::Connect { .. }, Some(dev)) = (op.kind(), op.device()) {
                        radio.close(dev);
                    }
                }
                self.finish(op);
            }
        }

        self.pump(radio);
    }

    /// Routes one native callback to the executing operation.
    pub fn deliver(
        &mut self,
        device: &DeviceId,
        event: &NativeEvent,
        radio: &dyn NativeRadio,
    ) -> Delivery {
        let Some(op) = self.current.as_mut() else {
            return Delivery::Unmatched;
        };
        if !op.is_for_device(device) || !op.on_outcome(event, radio) {
            return Delivery::Unmatched;
        }

        let delivery = Delivery::Consumed {
            id: op.id(),
            kind: op.kind().clone(),
            explicit: op.is_explicit(),
        };
        if op.state().is_terminal() {
            if let Some(op) = self.current.take() {
                self.finish(op);
            }
            self.pump(radio);
        }
        delivery
    }

    /// Soft-cancels every pending or executing operation matching `pred`.
    ///
    /// Returns how many were cancelled. Does not promote; call
    /// [`pump`](Self::pump) afterwards if the slot may have been freed.
    pub fn cancel<F>(&mut self, pred: F, cause: CancelCause) -> usize
    where
        F: Fn(&Operation) -> bool,
    {
        let mut count = 0;

        if self.current.as_ref().is_some_and(&pred) {
            if let Some(mut op) = self.current.take() {
                if op.cancel(cause) {
                    count += 1;
                }
                self.finish(op);
            }
        }

        let mut kept = Vec::with_capacity(self.pending.len());
        for mut op in std::mem::take(&mut self.pending) {
            if pred(&op) && op.cancel(cause) {
                count += 1;
                self.finish(op);
            } else {
                kept.push(op);
            }
        }
        self.pending = kept;
        count
    }

    /// Reserves the device's read/write ordering for `txn`.
    pub fn lock(&mut self, device: DeviceId, txn: TxnId) {
        self.locks.insert(device, txn);
    }

    /// Releases a device lock. Returns `true` if one was held.
    pub fn unlock(&mut self, device: &DeviceId) -> bool {
        self.locks.remove(device).is_some()
    }

    /// Takes every report produced since the last call, oldest first.
    pub fn drain_reports(&mut self) -> Vec<Report> {
        std::mem::take(&mut self.finished)
    }

    pub fn has_reports(&self) -> bool {
        !self.finished.is_empty()
    }

    pub fn current(&self) -> Option<&Operation> {
        self.current.as_ref()
    }

    /// True if any scheduled operation matches `pred`.
    pub fn contains<F>(&self, pred: F) -> bool
    where
        F: Fn(&Operation) -> bool,
    {
        self.current.iter().chain(self.pending.iter()).any(pred)
    }

    /// Number of scheduled operations (pending plus executing).
    pub fn len(&self) -> usize {
        self.pending.len() + usize::from(self.current.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            current: self.current.as_ref().map(OperationView::from),
            pending: self.pending.iter().map(OperationView::from).collect(),
        }
    }

    fn is_held(&self, op: &Operation) -> bool {
        if !op.kind().is_read_write() {
            return false;
        }
        match op.device().and_then(|dev| self.locks.get(dev)) {
            Some(holder) => op.txn() != Some(*holder),
            None => false,
        }
    }

    fn finish(&mut self, op: Operation) {
        let report = op.into_report();

        let kind = match report.state {
            OperationState::Succeeded => EventKind::OperationSucceeded,
            OperationState::TimedOut => EventKind::OperationTimedOut,
            OperationState::SoftlyCancelled => EventKind::OperationCancelled,
            _ => EventKind::OperationFailed,
        };
        let mut ev = Event::new(kind)
            .with_operation(report.id.get())
            .with_label(report.kind.as_label());
        if let Some(dev) = report.target.device() {
            ev = ev.with_device(dev.as_arc());
        }
        ev = match (&report.error, report.state) {
            (_, OperationState::Succeeded) => ev.with_delay(report.transit_time),
            (Some(crate::OperationError::TimedOut { timeout }), _) => ev.with_timeout(*timeout),
            (Some(crate::OperationError::Cancelled { cause }), _) => ev.with_reason(cause.as_label()),
            (Some(err), _) => ev.with_reason(err.as_label()),
            (None, _) => ev,
        };
        self.bus.publish(ev);

        match report.state {
            OperationState::Succeeded | OperationState::SoftlyCancelled => {
                debug!(op = %report.id, kind = report.kind.as_label(), state = report.state.as_label(), "operation ended")
            }
            _ => warn!(
                op = %report.id,
                kind = report.kind.as_label(),
                state = report.state.as_label(),
                error = report.error.as_ref().map(|e| e.as_label()).unwrap_or(""),
                "operation ended without success"
            ),
        }

        self.finished.push(report);
    }
}
