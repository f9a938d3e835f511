//! Connection pipeline, failure handling and GATT traffic of one device.
//!
//! Everything here runs with the device lock held. Side effects that must
//! not happen under the lock (listener calls) go through [`Cx::post`].

use std::time::Duration;

use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::coordinators::{
    NotifyState, ReconnectStep, Transaction, TxnId, TxnKind, TxnRequest, TxnSignal, Verdict,
};
use crate::error::{CancelCause, ManagerError, OperationError};
use crate::events::{Event, EventKind};
use crate::manager::Core;
use crate::native::{BondState, Characteristic, NativeEvent, NativeRadio};
use crate::operation::{
    Operation, OperationId, OperationKind, OperationState, Priority, ReadKind, Report, Target,
};
use crate::policies::ConnectionFailReason;
use crate::scheduler::Delivery;
use crate::state::{DeviceState, StateChange, describe};

use super::device::{DeviceInner, RwRequest};
use super::result::{ReadWriteKind, ReadWriteListener, ReadWriteResult};
use super::DeviceId;

use DeviceState::*;

/// Device flag for a native bond state.
pub(super) fn bond_flag(state: BondState) -> DeviceState {
    match state {
        BondState::None => Unbonded,
        BondState::Bonding => Bonding,
        BondState::Bonded => Bonded,
    }
}

fn gatt_status(err: &Option<OperationError>) -> Option<i32> {
    match err {
        Some(OperationError::FailedEventually { status }) => Some(*status),
        _ => None,
    }
}

fn bond_pairs(flag: DeviceState) -> [(DeviceState, bool); 3] {
    DeviceState::BOND.map(|b| (b, b == flag))
}

/// Borrowed access to the manager while the device lock is held.
pub(crate) struct Cx<'a> {
    core: &'a Core,
    id: &'a DeviceId,
}

impl<'a> Cx<'a> {
    pub(crate) fn new(core: &'a Core, id: &'a DeviceId) -> Self {
        Self { core, id }
    }

    fn radio(&self) -> &dyn NativeRadio {
        self.core.radio.as_ref()
    }

    fn target(&self) -> Target {
        Target::Device(self.id.clone())
    }

    fn op(&self, kind: OperationKind) -> Operation {
        Operation::new(self.target(), kind).with_timeout(self.core.cfg.operation_timeout_opt())
    }

    fn submit(&self, op: Operation) -> OperationId {
        self.core.submit(op)
    }

    /// Soft-cancels this device's operations matching `pred`.
    fn cancel<F>(&self, pred: F, cause: CancelCause) -> usize
    where
        F: Fn(&OperationKind) -> bool,
    {
        let id = self.id;
        self.core
            .cancel(|op| op.is_for_device(id) && pred(op.kind()), cause)
    }

    fn has_op<F>(&self, pred: F) -> bool
    where
        F: Fn(&OperationKind) -> bool,
    {
        let id = self.id;
        self.core
            .scheduler
            .lock()
            .contains(|op| op.is_for_device(id) && pred(op.kind()))
    }

    fn publish(&self, ev: Event) {
        self.core.bus.publish(ev.with_device(self.id.as_arc()));
    }

    fn post(&self, f: impl FnOnce() + Send + 'static) {
        self.core.post(Box::new(f));
    }

    fn diagnostic(&self, message: &'static str) {
        self.core.diagnostic(Some(self.id), message);
    }

    fn characteristic(&self, uuid: Uuid) -> Option<Characteristic> {
        self.radio()
            .characteristics(self.id)
            .into_iter()
            .find(|c| c.uuid == uuid)
    }
}

impl DeviceInner {
    // ---- state ----

    fn update(&mut self, cx: &Cx<'_>, pairs: &[(DeviceState, bool)]) {
        if let Some(change) = self.state.update(pairs) {
            self.emit(cx, change);
        }
    }

    fn set(&mut self, cx: &Cx<'_>, pairs: &[(DeviceState, bool)]) {
        if let Some(change) = self.state.set(pairs) {
            self.emit(cx, change);
        }
    }

    fn emit(&self, cx: &Cx<'_>, change: StateChange<DeviceState>) {
        debug!(device = %cx.id, state = %describe::<DeviceState>(change.new), "state changed");
        cx.publish(Event::new(EventKind::DeviceStateChanged).with_masks(change.old, change.new));
        if let Some(listener) = self.state_listener.clone() {
            cx.post(move || listener(&change));
        }
    }

    fn set_disconnected(&mut self, cx: &Cx<'_>, attempting_reconnect: bool) {
        let bond = bond_flag(cx.radio().bond_state(cx.id));
        let cluster = DeviceState::disconnected_cluster(bond, attempting_reconnect);
        self.set(cx, &cluster);
    }

    // ---- connection ----

    pub(super) fn connect_explicitly(&mut self, cx: &Cx<'_>) {
        let stopped = self.stop_reconnect(cx, "explicit_connect");
        self.connection_fail.on_explicit_connection_started();

        if self.state.is_any(&[Initialized, ConnectingOverall]) {
            if stopped {
                self.update(cx, &[(AttemptingReconnect, false)]);
            }
            return;
        }
        self.connect(cx, true);
    }

    fn connect(&mut self, cx: &Cx<'_>, explicit: bool) {
        if self.state.is(Initialized) && !self.state.is(Connected) {
            cx.diagnostic("initialized but not connected; resetting to disconnected");
            self.set_disconnected(cx, self.reconnect.is_running());
        }

        let auto_connect = cx.core.cfg.always_use_auto_connect;
        cx.submit(
            cx.op(OperationKind::Connect { auto_connect })
                .with_explicit(explicit),
        );
        self.update(
            cx,
            &[
                (Disconnected, false),
                (Advertising, false),
                (ConnectingOverall, true),
                (Connecting, true),
            ],
        );
        info!(device = %cx.id, explicit, auto_connect, "connecting");
    }

    fn on_link_up(&mut self, cx: &Cx<'_>) {
        self.update(
            cx,
            &[
                (Disconnected, false),
                (Advertising, false),
                (ConnectingOverall, true),
                (Connecting, false),
                (Connected, true),
            ],
        );
        info!(device = %cx.id, "link up");

        if cx.core.cfg.auto_bond_after_connect && !self.state.is_any(&[Bonding, Bonded]) {
            self.submit_bond(cx, false, true);
        }
        if cx.core.cfg.auto_get_services {
            cx.submit(cx.op(OperationKind::DiscoverServices));
            self.update(cx, &[(GettingServices, true)]);
        } else {
            self.run_auth_or_init(cx);
        }
    }

    fn run_auth_or_init(&mut self, cx: &Cx<'_>) {
        if let Some(factory) = self.auth_factory.clone() {
            self.update(cx, &[(GettingServices, false), (Authenticating, true)]);
            self.start_txn(cx, TxnKind::Authentication, factory());
        } else {
            self.run_init(cx);
        }
    }

    fn run_init(&mut self, cx: &Cx<'_>) {
        if let Some(factory) = self.init_factory.clone() {
            self.update(
                cx,
                &[
                    (GettingServices, false),
                    (Authenticating, false),
                    (Authenticated, true),
                    (Initializing, true),
                ],
            );
            self.start_txn(cx, TxnKind::Initialization, factory());
        } else {
            self.on_fully_initialized(cx);
        }
    }

    fn on_fully_initialized(&mut self, cx: &Cx<'_>) {
        self.connection_fail.on_fully_initialized();
        self.stop_reconnect(cx, "reconnected");
        self.update(
            cx,
            &[
                (AttemptingReconnect, false),
                (ConnectingOverall, false),
                (Connecting, false),
                (GettingServices, false),
                (Authenticating, false),
                (Authenticated, true),
                (Initializing, false),
                (Initialized, true),
            ],
        );
        info!(device = %cx.id, "initialized");

        for uuid in self.poll.enable_notifications() {
            self.submit_toggle(cx, uuid, true, None);
        }
    }

    /// Reports a failure to the connection-fail coordinator without acting on it.
    fn judge(
        &mut self,
        cx: &Cx<'_>,
        reason: ConnectionFailReason,
        status: Option<i32>,
    ) -> Verdict {
        let mode = self.reconnect.mode();
        let verdict = self.connection_fail.on_connection_failed(reason, status, mode);
        let answer = if verdict.please.is_retry() {
            "retry"
        } else {
            "do_not_retry"
        };
        cx.publish(
            Event::new(EventKind::ConnectionFailed)
                .with_reason(reason.as_label())
                .with_label(answer)
                .with_attempt(verdict.event.failure_count),
        );
        warn!(
            device = %cx.id,
            reason = reason.as_label(),
            failures = verdict.event.failure_count,
            mode = mode.as_label(),
            verdict = answer,
            "connection attempt failed"
        );
        verdict
    }

    fn on_connect_fail(&mut self, cx: &Cx<'_>, reason: ConnectionFailReason, status: Option<i32>) {
        let verdict = self.judge(cx, reason, status);
        self.abort_txn(cx);
        self.poll.reset();
        if reason.was_connected() && cx.radio().is_connected(cx.id) {
            cx.submit(cx.op(OperationKind::Disconnect));
        }

        if self.reconnect.is_running() {
            if self.reconnect.on_attempt_failed() == ReconnectStep::Exhausted {
                self.publish_reconnect_stopped(cx, "exhausted");
                self.set_disconnected(cx, false);
            } else {
                self.set_disconnected(cx, true);
            }
            return;
        }

        if verdict.should_retry() {
            let bond = bond_flag(cx.radio().bond_state(cx.id));
            let mut cluster = vec![
                (Discovered, true),
                (ConnectingOverall, true),
                (Connecting, true),
            ];
            cluster.extend(bond_pairs(bond));
            self.set(cx, &cluster);
            self.connect(cx, false);
        } else {
            cx.cancel(
                |k| matches!(k, OperationKind::Connect { .. }),
                CancelCause::Superseded,
            );
            self.set_disconnected(cx, false);
        }
    }

    pub(super) fn disconnect_explicitly(&mut self, cx: &Cx<'_>) {
        let mid_connection = self.state.is(ConnectingOverall) && !self.state.is(Initialized);
        let stopped = self.stop_reconnect(cx, "explicit_disconnect");
        let busy = self.state.is_any(&[Connected, ConnectingOverall])
            || cx.has_op(|k| matches!(k, OperationKind::Connect { .. }));
        if !busy && !stopped {
            return;
        }

        if mid_connection {
            self.judge(cx, ConnectionFailReason::ExplicitlyCancelled, None);
        }
        self.connection_fail.on_explicit_disconnect();
        cx.cancel(
            |k| matches!(k, OperationKind::Connect { .. }) || k.requires_connection(),
            CancelCause::Disconnect,
        );
        self.abort_txn(cx);
        self.poll.reset();

        cx.submit(cx.op(OperationKind::Disconnect).with_explicit(true));
        self.set_disconnected(cx, false);
        info!(device = %cx.id, "disconnecting explicitly");

        if cx.core.cfg.remove_bond_on_disconnect {
            cx.submit(cx.op(OperationKind::Unbond));
        }
    }

    fn on_rogue_disconnect(&mut self, cx: &Cx<'_>, status: i32) {
        let was_initialized = self.state.is(Initialized);
        warn!(device = %cx.id, status, was_initialized, "link dropped");

        cx.radio().close(cx.id);
        self.since_discovery = Duration::ZERO;
        cx.cancel(|_| true, CancelCause::Disconnect);
        self.abort_txn(cx);
        self.poll.reset();

        if was_initialized {
            let started = self.reconnect.start(true, false);
            if started {
                cx.publish(Event::new(EventKind::ReconnectStarted));
                info!(device = %cx.id, "reconnect loop started");
            }
            // Observed only; the reconnect policy owns recovery from here.
            self.judge(cx, ConnectionFailReason::RogueDisconnect, Some(status));
            self.set_disconnected(cx, started);
        } else {
            self.on_connect_fail(cx, ConnectionFailReason::RogueDisconnect, Some(status));
        }

        if cx.core.cfg.remove_bond_on_disconnect {
            cx.submit(cx.op(OperationKind::Unbond));
        }
    }

    fn stop_reconnect(&mut self, cx: &Cx<'_>, reason: &'static str) -> bool {
        let stopped = self.reconnect.stop();
        if stopped {
            self.publish_reconnect_stopped(cx, reason);
        }
        stopped
    }

    fn publish_reconnect_stopped(&self, cx: &Cx<'_>, reason: &'static str) {
        cx.publish(
            Event::new(EventKind::ReconnectStopped)
                .with_reason(reason)
                .with_attempt(self.reconnect.attempts()),
        );
        info!(device = %cx.id, reason, attempts = self.reconnect.attempts(), "reconnect loop stopped");
    }

    // ---- bonding ----

    pub(super) fn bond(&mut self, cx: &Cx<'_>) {
        if self.state.is_any(&[Bonding, Bonded]) {
            return;
        }
        self.submit_bond(cx, true, false);
    }

    fn submit_bond(&mut self, cx: &Cx<'_>, explicit: bool, part_of_connection: bool) {
        cx.submit(
            cx.op(OperationKind::Bond { part_of_connection })
                .with_explicit(explicit),
        );
        self.update(cx, &bond_pairs(Bonding));
    }

    pub(super) fn unbond(&mut self, cx: &Cx<'_>) {
        cx.cancel(
            |k| matches!(k, OperationKind::Bond { .. }),
            CancelCause::Superseded,
        );
        cx.submit(cx.op(OperationKind::Unbond).with_explicit(true));
    }

    fn on_bond_report(&mut self, cx: &Cx<'_>, report: &Report) {
        let flag = match (&report.kind, report.state) {
            (OperationKind::Bond { .. }, OperationState::Succeeded) => Bonded,
            (OperationKind::Unbond, OperationState::Succeeded) => Unbonded,
            _ => bond_flag(cx.radio().bond_state(cx.id)),
        };
        if !report.succeeded() {
            debug!(device = %cx.id, kind = report.kind.as_label(), state = report.state.as_label(), "bond change did not complete");
        }
        self.update(cx, &bond_pairs(flag));
    }

    // ---- transactions ----

    fn start_txn(&mut self, cx: &Cx<'_>, kind: TxnKind, txn: Box<dyn Transaction>) -> bool {
        let Some((id, signals)) = self.txn.start(kind, txn) else {
            return false;
        };
        cx.core.scheduler.lock().lock(cx.id.clone(), id);
        cx.publish(Event::new(EventKind::TransactionStarted).with_label(kind.as_label()));
        debug!(device = %cx.id, txn = %id, kind = kind.as_label(), "transaction started");
        self.handle_txn_signals(cx, signals);
        true
    }

    fn handle_txn_signals(&mut self, cx: &Cx<'_>, signals: Vec<TxnSignal>) {
        for signal in signals {
            match signal {
                TxnSignal::Request(id, TxnRequest::Read(uuid)) => {
                    let kind = OperationKind::Read {
                        uuid,
                        kind: ReadKind::Read,
                    };
                    self.submit_rw(cx, uuid, ReadWriteKind::Read, kind, None, Some(id));
                }
                TxnSignal::Request(id, TxnRequest::Write(uuid, data)) => {
                    let kind = OperationKind::Write { uuid, data };
                    self.submit_rw(cx, uuid, ReadWriteKind::Write, kind, None, Some(id));
                }
                TxnSignal::Ended {
                    id,
                    kind,
                    succeeded,
                } => self.on_txn_ended(cx, id, kind, succeeded),
            }
        }
    }

    fn on_txn_ended(&mut self, cx: &Cx<'_>, id: TxnId, kind: TxnKind, succeeded: bool) {
        self.release_lock(cx);
        cx.publish(
            Event::new(EventKind::TransactionEnded)
                .with_label(kind.as_label())
                .with_reason(if succeeded { "succeeded" } else { "failed" }),
        );
        debug!(device = %cx.id, txn = %id, kind = kind.as_label(), succeeded, "transaction ended");

        match (kind, succeeded) {
            (TxnKind::Authentication, true) => self.run_init(cx),
            (TxnKind::Authentication, false) => {
                self.on_connect_fail(cx, ConnectionFailReason::AuthenticationFailed, None)
            }
            (TxnKind::Initialization, true) => self.on_fully_initialized(cx),
            (TxnKind::Initialization, false) => {
                self.on_connect_fail(cx, ConnectionFailReason::InitializationFailed, None)
            }
            (TxnKind::FirmwareUpdate, _) => self.update(cx, &[(UpdatingFirmware, false)]),
        }
    }

    fn abort_txn(&mut self, cx: &Cx<'_>) {
        if let Some((id, kind)) = self.txn.cancel() {
            self.release_lock(cx);
            cx.publish(
                Event::new(EventKind::TransactionEnded)
                    .with_label(kind.as_label())
                    .with_reason("cancelled"),
            );
            debug!(device = %cx.id, txn = %id, kind = kind.as_label(), "transaction cancelled");
        }
    }

    fn release_lock(&self, cx: &Cx<'_>) {
        let mut scheduler = cx.core.scheduler.lock();
        if scheduler.unlock(cx.id) {
            scheduler.pump(cx.radio());
        }
    }

    pub(super) fn update_firmware(
        &mut self,
        cx: &Cx<'_>,
        txn: Box<dyn Transaction>,
    ) -> Result<(), ManagerError> {
        if !self.state.is(Initialized) {
            return Err(ManagerError::NotInitialized { id: cx.id.clone() });
        }
        if self.state.is(UpdatingFirmware) || self.txn.is_running() {
            return Err(ManagerError::AlreadyUpdatingFirmware { id: cx.id.clone() });
        }
        self.update(cx, &[(UpdatingFirmware, true)]);
        self.start_txn(cx, TxnKind::FirmwareUpdate, txn);
        Ok(())
    }

    // ---- GATT traffic ----

    pub(super) fn read(
        &mut self,
        cx: &Cx<'_>,
        uuid: Uuid,
        listener: Option<ReadWriteListener>,
    ) -> Option<OperationId> {
        let kind = OperationKind::Read {
            uuid,
            kind: ReadKind::Read,
        };
        self.submit_rw(cx, uuid, ReadWriteKind::Read, kind, listener, None)
    }

    pub(super) fn write(
        &mut self,
        cx: &Cx<'_>,
        uuid: Uuid,
        data: Vec<u8>,
        listener: Option<ReadWriteListener>,
    ) -> Option<OperationId> {
        let kind = OperationKind::Write { uuid, data };
        self.submit_rw(cx, uuid, ReadWriteKind::Write, kind, listener, None)
    }

    fn submit_rw(
        &mut self,
        cx: &Cx<'_>,
        uuid: Uuid,
        rw: ReadWriteKind,
        kind: OperationKind,
        listener: Option<ReadWriteListener>,
        txn: Option<TxnId>,
    ) -> Option<OperationId> {
        let early = if !self.state.is(Connected) {
            Some(OperationError::NotConnected)
        } else if cx.characteristic(uuid).is_none() {
            Some(OperationError::NoMatchingTarget { uuid })
        } else {
            None
        };
        if let Some(err) = early {
            let result = ReadWriteResult::early_out(cx.id.clone(), uuid, rw, &err);
            debug!(device = %cx.id, %uuid, kind = rw.as_label(), error = %err, "request failed early");
            self.route_result(cx, result, listener, txn);
            return None;
        }

        let mut op = cx.op(kind);
        if let Some(txn) = txn {
            op = op
                .with_txn(txn)
                .with_priority(Priority::ForPriorityReadsWrites);
        }
        let id = cx.submit(op);
        self.requests.insert(
            id,
            RwRequest {
                uuid,
                kind: rw,
                listener,
            },
        );
        Some(id)
    }

    pub(super) fn enable_notify(
        &mut self,
        cx: &Cx<'_>,
        uuid: Uuid,
        force_read_timeout: Option<Duration>,
        listener: Option<ReadWriteListener>,
    ) {
        self.poll
            .start(uuid, force_read_timeout, listener.clone(), false, true);
        if !self.state.is(Initialized) || self.poll.notify_state(uuid) != NotifyState::NotEnabled {
            return;
        }
        self.poll.on_notify_state(uuid, NotifyState::Enabling);
        self.submit_toggle(cx, uuid, true, listener);
    }

    pub(super) fn disable_notify(
        &mut self,
        cx: &Cx<'_>,
        uuid: Uuid,
        force_read_timeout: Option<Duration>,
        listener: Option<ReadWriteListener>,
    ) {
        self.poll
            .stop(uuid, force_read_timeout, listener.as_ref(), true);
        if self.poll.wants_notify(uuid) || !self.state.is(Connected) {
            return;
        }
        self.submit_toggle(cx, uuid, false, listener);
    }

    fn submit_toggle(
        &mut self,
        cx: &Cx<'_>,
        uuid: Uuid,
        enable: bool,
        listener: Option<ReadWriteListener>,
    ) {
        let rw = if enable {
            ReadWriteKind::EnablingNotification
        } else {
            ReadWriteKind::DisablingNotification
        };
        let Some(characteristic) = cx.characteristic(uuid) else {
            if enable {
                self.poll.on_notify_state(uuid, NotifyState::NotEnabled);
            }
            let result = ReadWriteResult::early_out(
                cx.id.clone(),
                uuid,
                rw,
                &OperationError::NoMatchingTarget { uuid },
            );
            self.route_result(cx, result, listener, None);
            return;
        };
        let kind = OperationKind::ToggleNotify {
            uuid,
            enable,
            value: characteristic.toggle_value(enable),
        };
        let id = cx.submit(cx.op(kind));
        self.requests.insert(
            id,
            RwRequest {
                uuid,
                kind: rw,
                listener,
            },
        );
    }

    fn on_rw_report(&mut self, cx: &Cx<'_>, report: &Report) {
        let Some(req) = self.requests.remove(&report.id) else {
            return;
        };
        let result = ReadWriteResult::from_report(cx.id.clone(), req.uuid, req.kind, report);
        self.record_timing(cx, &result);

        if let OperationKind::ToggleNotify { enable: true, .. } = report.kind {
            let state = if result.was_success() {
                NotifyState::Enabled
            } else {
                NotifyState::NotEnabled
            };
            self.poll.on_notify_state(req.uuid, state);
        }
        if matches!(report.kind, OperationKind::ToggleNotify { .. })
            && report.state == OperationState::TimedOut
        {
            cx.diagnostic("notification toggle timed out");
        }

        self.route_result(cx, result, req.listener, report.txn);
    }

    fn route_result(
        &mut self,
        cx: &Cx<'_>,
        result: ReadWriteResult,
        listener: Option<ReadWriteListener>,
        txn: Option<TxnId>,
    ) {
        if let Some(txn) = txn {
            let signals = self.txn.on_result(txn, &result);
            self.handle_txn_signals(cx, signals);
            return;
        }

        let read_kind = match result.kind {
            ReadWriteKind::Poll => Some(ReadKind::Poll),
            ReadWriteKind::PseudoNotification => Some(ReadKind::PseudoNotification),
            _ => None,
        };
        match read_kind {
            Some(kind) => {
                let value = result.was_success().then_some(result.data.as_slice());
                let listeners = self.poll.on_read_result(result.uuid, kind, value);
                for listener in listeners {
                    self.deliver(cx, listener, result.clone());
                }
            }
            None => self.deliver(cx, listener, result),
        }
    }

    fn deliver(&self, cx: &Cx<'_>, listener: Option<ReadWriteListener>, result: ReadWriteResult) {
        if let Some(listener) = listener.or_else(|| self.default_listener.clone()) {
            cx.post(move || listener(&result));
        }
    }

    fn record_timing(&mut self, cx: &Cx<'_>, result: &ReadWriteResult) {
        if !result.was_success() {
            return;
        }
        if self.state.is(UpdatingFirmware)
            && !cx.core.cfg.include_firmware_update_times_in_average
        {
            return;
        }
        match result.kind {
            ReadWriteKind::Read | ReadWriteKind::Poll | ReadWriteKind::PseudoNotification => {
                self.read_times.add(result.transit_time)
            }
            ReadWriteKind::Write => self.write_times.add(result.transit_time),
            _ => {}
        }
    }

    fn on_notification(&mut self, cx: &Cx<'_>, uuid: Uuid, value: &[u8]) {
        cx.publish(Event::new(EventKind::NotificationReceived).with_uuid(uuid));
        trace!(device = %cx.id, %uuid, len = value.len(), "notification");

        let result = ReadWriteResult::notification(cx.id.clone(), uuid, value.to_vec());
        if !self.poll.wants_notify(uuid) {
            self.deliver(cx, None, result);
            return;
        }
        for listener in self.poll.on_notification(uuid, value) {
            self.deliver(cx, listener, result.clone());
        }
    }

    // ---- scheduler and radio input ----

    pub(super) fn on_report(&mut self, cx: &Cx<'_>, report: Report) {
        match &report.kind {
            OperationKind::Connect { .. } => match (report.state, &report.error) {
                (OperationState::Succeeded, _) => self.on_link_up(cx),
                (OperationState::TimedOut, _) => {
                    self.on_connect_fail(cx, ConnectionFailReason::NativeConnectionTimedOut, None)
                }
                (OperationState::Failed, err) => self.on_connect_fail(
                    cx,
                    ConnectionFailReason::NativeConnectionFailed,
                    gatt_status(err),
                ),
                _ if report.is_soft_cancel() => {
                    if self.reconnect.on_attempt_cancelled() {
                        debug!(device = %cx.id, op = %report.id, "reconnect attempt cancelled");
                        self.set_disconnected(cx, true);
                    }
                }
                _ => {}
            },
            OperationKind::DiscoverServices => match (report.state, &report.error) {
                (OperationState::Succeeded, _) => {
                    self.update(cx, &[(GettingServices, false)]);
                    self.run_auth_or_init(cx);
                }
                (OperationState::Failed | OperationState::TimedOut, err) => self.on_connect_fail(
                    cx,
                    ConnectionFailReason::GettingServicesFailed,
                    gatt_status(err),
                ),
                _ => {}
            },
            OperationKind::Bond { .. } | OperationKind::Unbond => self.on_bond_report(cx, &report),
            OperationKind::Read { .. }
            | OperationKind::Write { .. }
            | OperationKind::ToggleNotify { .. } => self.on_rw_report(cx, &report),
            OperationKind::Disconnect | OperationKind::SendResponse { .. } => {
                trace!(device = %cx.id, op = %report.id, state = report.state.as_label(), "report");
            }
        }
    }

    pub(super) fn on_native_event(&mut self, cx: &Cx<'_>, event: &NativeEvent, delivery: Delivery) {
        if let Delivery::Consumed { id, .. } = delivery {
            trace!(device = %cx.id, op = %id, event = event.label(), "callback consumed");
            return;
        }
        match event {
            NativeEvent::Disconnected { status } if self.state.is(Connected) => {
                self.on_rogue_disconnect(cx, *status)
            }
            NativeEvent::BondStateChanged { state, .. } => {
                self.update(cx, &bond_pairs(bond_flag(*state)))
            }
            NativeEvent::Notification { uuid, value } => self.on_notification(cx, *uuid, value),
            _ => {
                debug!(device = %cx.id, event = event.label(), "unmatched callback ignored");
            }
        }
    }

    pub(super) fn tick(&mut self, cx: &Cx<'_>, elapsed: Duration) {
        self.since_discovery += elapsed;

        if let ReconnectStep::Attempt(n) = self.reconnect.update(elapsed) {
            cx.publish(Event::new(EventKind::ReconnectAttempt).with_attempt(n));
            info!(device = %cx.id, attempt = n, "reconnect attempt");
            self.connect(cx, false);
        }

        for read in self.poll.update(elapsed, self.state.is(Initialized)) {
            let rw = ReadWriteKind::from(read.kind);
            cx.publish(Event::new(EventKind::PollReadScheduled).with_uuid(read.uuid));
            let kind = OperationKind::Read {
                uuid: read.uuid,
                kind: read.kind,
            };
            self.submit_rw(cx, read.uuid, rw, kind, None, None);
        }

        let signals = self.txn.update(elapsed);
        self.handle_txn_signals(cx, signals);
    }

    // ---- discovery and radio ----

    pub(super) fn on_discovered(&mut self, cx: &Cx<'_>) {
        self.since_discovery = Duration::ZERO;
        if cx.core.cfg.remove_bond_on_discovery && self.state.is(Bonded) {
            cx.submit(cx.op(OperationKind::Unbond));
        }
    }

    pub(super) fn on_rediscovered(&mut self, cx: &Cx<'_>) {
        self.since_discovery = Duration::ZERO;
        if self.state.is(Disconnected) && !self.state.is(AttemptingReconnect) {
            self.update(cx, &[(Advertising, true)]);
        }
    }

    pub(super) fn on_undiscovered(&mut self, cx: &Cx<'_>) {
        self.stop_reconnect(cx, "undiscovered");
        cx.cancel(|_| true, CancelCause::Undiscovered);
        self.abort_txn(cx);
        self.poll.reset();
        if cx.radio().is_connected(cx.id) {
            cx.radio().close(cx.id);
        }
        let mut cluster = vec![(Undiscovered, true), (Disconnected, true)];
        cluster.extend(bond_pairs(bond_flag(cx.radio().bond_state(cx.id))));
        self.set(cx, &cluster);
    }

    /// Operations were already cancelled by the manager.
    pub(super) fn on_radio_off(&mut self, cx: &Cx<'_>) {
        self.stop_reconnect(cx, "radio_off");
        self.abort_txn(cx);
        self.poll.reset();
        if self
            .state
            .is_any(&[Connected, ConnectingOverall, AttemptingReconnect])
        {
            self.set_disconnected(cx, false);
        }
    }
}
