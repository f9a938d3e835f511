use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::coordinators::{
    ConnectionFailCoordinator, NotifyState, PollCoordinator, ReconnectCoordinator,
    TransactionCoordinator, Transaction, TxnFactory,
};
use crate::error::ManagerError;
use crate::manager::Core;
use crate::native::NativeEvent;
use crate::operation::{OperationId, Report};
use crate::policies::{ConnectionFailPolicy, ReconnectPolicy};
use crate::state::{DeviceState, State, StateListener, StateTracker};

use super::pipeline::{Cx, bond_flag};
use super::result::{ReadWriteKind, ReadWriteListener};
use super::timing::RunningAverage;
use super::DeviceId;

/// Listener bookkeeping for one scheduled read, write or notify toggle.
pub(super) struct RwRequest {
    pub(super) uuid: Uuid,
    pub(super) kind: ReadWriteKind,
    pub(super) listener: Option<ReadWriteListener>,
}

/// Everything guarded by the device lock.
pub(super) struct DeviceInner {
    pub(super) state: StateTracker<DeviceState>,
    pub(super) state_listener: Option<StateListener<DeviceState>>,
    pub(super) default_listener: Option<ReadWriteListener>,
    pub(super) connection_fail: ConnectionFailCoordinator,
    pub(super) reconnect: ReconnectCoordinator,
    pub(super) poll: PollCoordinator,
    pub(super) txn: TransactionCoordinator,
    pub(super) auth_factory: Option<TxnFactory>,
    pub(super) init_factory: Option<TxnFactory>,
    pub(super) requests: HashMap<OperationId, RwRequest>,
    pub(super) since_discovery: Duration,
    pub(super) read_times: RunningAverage,
    pub(super) write_times: RunningAverage,
}

/// Handle to one discovered peripheral.
///
/// Obtained from [`Manager::discover`](crate::Manager::discover) or
/// [`Manager::device`](crate::Manager::device). Every method is non-blocking:
/// work is queued on the manager's scheduler and outcomes arrive through
/// listeners.
pub struct Device {
    id: DeviceId,
    core: Weak<Core>,
    inner: Mutex<DeviceInner>,
}

impl Device {
    pub(crate) fn new(id: DeviceId, core: &Arc<Core>) -> Arc<Self> {
        let bond = bond_flag(core.radio.bond_state(&id));
        let window = core.cfg.running_average_window();
        let inner = DeviceInner {
            state: StateTracker::new(&[
                DeviceState::Discovered,
                DeviceState::Disconnected,
                DeviceState::Advertising,
                bond,
            ]),
            state_listener: None,
            default_listener: None,
            connection_fail: ConnectionFailCoordinator::new(id.clone(), core.fail_policy.clone()),
            reconnect: ReconnectCoordinator::new(id.clone(), core.reconnect_policy.clone()),
            poll: PollCoordinator::new(),
            txn: TransactionCoordinator::new(id.clone()),
            auth_factory: None,
            init_factory: None,
            requests: HashMap::new(),
            since_discovery: Duration::ZERO,
            read_times: RunningAverage::new(window),
            write_times: RunningAverage::new(window),
        };
        Arc::new(Self {
            id,
            core: Arc::downgrade(core),
            inner: Mutex::new(inner),
        })
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    // ---- state queries ----

    /// Current state bitmask.
    pub fn mask(&self) -> u32 {
        self.inner.lock().state.mask()
    }

    /// Current states, in declaration order.
    pub fn states(&self) -> Vec<DeviceState> {
        DeviceState::decode(self.mask())
    }

    pub fn is(&self, state: DeviceState) -> bool {
        self.inner.lock().state.is(state)
    }

    /// True if any of `states` is set.
    pub fn is_any(&self, states: &[DeviceState]) -> bool {
        self.inner.lock().state.is_any(states)
    }

    /// True if every `(state, expected)` pair holds.
    pub fn is_all(&self, query: &[(DeviceState, bool)]) -> bool {
        self.inner.lock().state.is_all(query)
    }

    pub fn connection_fail_count(&self) -> u32 {
        self.inner.lock().connection_fail.failure_count()
    }

    pub fn is_reconnecting(&self) -> bool {
        self.inner.lock().reconnect.is_running()
    }

    pub fn time_since_last_discovery(&self) -> Duration {
        self.inner.lock().since_discovery
    }

    /// Mean transit time of recent successful reads.
    pub fn average_read_time(&self) -> Option<Duration> {
        self.inner.lock().read_times.average()
    }

    /// Mean transit time of recent successful writes.
    pub fn average_write_time(&self) -> Option<Duration> {
        self.inner.lock().write_times.average()
    }

    pub fn notify_state(&self, uuid: Uuid) -> NotifyState {
        self.inner.lock().poll.notify_state(uuid)
    }

    // ---- listeners and hooks ----

    /// Receives one call per state change, with the old and new masks.
    pub fn set_state_listener(&self, listener: Option<StateListener<DeviceState>>) {
        self.inner.lock().state_listener = listener;
    }

    /// Receives results of requests made without their own listener.
    pub fn set_default_listener(&self, listener: Option<ReadWriteListener>) {
        self.inner.lock().default_listener = listener;
    }

    /// Overrides the manager-wide connection-fail policy for this device.
    pub fn set_connection_fail_policy(&self, policy: Arc<dyn ConnectionFailPolicy>) {
        self.inner.lock().connection_fail.set_policy(policy);
    }

    /// Overrides the manager-wide reconnect policy for this device.
    pub fn set_reconnect_policy(&self, policy: Arc<dyn ReconnectPolicy>) {
        self.inner.lock().reconnect.set_policy(policy);
    }

    /// Transaction run after service discovery on every connection.
    pub fn set_auth_transaction(&self, factory: Option<TxnFactory>) {
        self.inner.lock().auth_factory = factory;
    }

    /// Transaction run after authentication on every connection.
    pub fn set_init_transaction(&self, factory: Option<TxnFactory>) {
        self.inner.lock().init_factory = factory;
    }

    // ---- connection ----

    /// Starts the connection pipeline. Stops a running reconnect loop.
    pub fn connect(&self) {
        self.run(|inner, cx| inner.connect_explicitly(cx));
    }

    /// Disconnects, cancelling connection-bound work. Never reconnects.
    pub fn disconnect(&self) {
        self.run(|inner, cx| inner.disconnect_explicitly(cx));
    }

    /// Bonds unless already bonding or bonded.
    pub fn bond(&self) {
        self.run(|inner, cx| inner.bond(cx));
    }

    pub fn unbond(&self) {
        self.run(|inner, cx| inner.unbond(cx));
    }

    // ---- GATT traffic ----

    /// Reads a characteristic.
    ///
    /// Returns `None` when the request failed early; the listener (or the
    /// default listener) still receives the result.
    pub fn read(&self, uuid: Uuid, listener: Option<ReadWriteListener>) -> Option<OperationId> {
        self.run(|inner, cx| inner.read(cx, uuid, listener)).flatten()
    }

    /// Writes a characteristic. Same early-out rules as [`read`](Self::read).
    pub fn write(
        &self,
        uuid: Uuid,
        data: impl Into<Vec<u8>>,
        listener: Option<ReadWriteListener>,
    ) -> Option<OperationId> {
        let data = data.into();
        self.run(|inner, cx| inner.write(cx, uuid, data, listener)).flatten()
    }

    /// Subscribes to notifications, now if initialized or on full initialization.
    ///
    /// With `force_read_timeout`, a read is forced whenever notifications stay
    /// silent that long.
    pub fn enable_notify(
        &self,
        uuid: Uuid,
        force_read_timeout: Option<Duration>,
        listener: Option<ReadWriteListener>,
    ) {
        self.run(|inner, cx| inner.enable_notify(cx, uuid, force_read_timeout, listener));
    }

    /// Removes matching notify entries; unsubscribes when none remain.
    pub fn disable_notify(
        &self,
        uuid: Uuid,
        force_read_timeout: Option<Duration>,
        listener: Option<ReadWriteListener>,
    ) {
        self.run(|inner, cx| inner.disable_notify(cx, uuid, force_read_timeout, listener));
    }

    /// Reads `uuid` every `interval` while initialized.
    pub fn start_poll(&self, uuid: Uuid, interval: Duration, listener: Option<ReadWriteListener>) {
        self.inner
            .lock()
            .poll
            .start(uuid, Some(interval), listener, false, false);
    }

    /// Like [`start_poll`](Self::start_poll), delivering only changed values.
    pub fn start_change_tracking_poll(
        &self,
        uuid: Uuid,
        interval: Duration,
        listener: Option<ReadWriteListener>,
    ) {
        self.inner
            .lock()
            .poll
            .start(uuid, Some(interval), listener, true, false);
    }

    /// Stops polls of `uuid`, optionally only those with this interval or listener.
    pub fn stop_poll(
        &self,
        uuid: Uuid,
        interval: Option<Duration>,
        listener: Option<&ReadWriteListener>,
    ) -> usize {
        self.inner.lock().poll.stop(uuid, interval, listener, false)
    }

    /// Runs a firmware-update transaction on an initialized device.
    pub fn update_firmware(&self, txn: impl Transaction) -> Result<(), ManagerError> {
        let txn: Box<dyn Transaction> = Box::new(txn);
        self.run(|inner, cx| inner.update_firmware(cx, txn))
            .unwrap_or(Err(ManagerError::ManagerGone))
    }

    // ---- crate-internal entry points (caller settles) ----

    pub(crate) fn on_report(&self, core: &Core, report: Report) {
        self.locked(core, |inner, cx| inner.on_report(cx, report));
    }

    pub(crate) fn on_native_event(&self, core: &Core, event: &NativeEvent) {
        self.locked(core, |inner, cx| {
            let delivery = core
                .scheduler
                .lock()
                .deliver(&self.id, event, core.radio.as_ref());
            inner.on_native_event(cx, event, delivery);
        });
    }

    pub(crate) fn tick(&self, core: &Core, elapsed: Duration) {
        self.locked(core, |inner, cx| inner.tick(cx, elapsed));
    }

    pub(crate) fn on_discovered(&self, core: &Core) {
        self.locked(core, |inner, cx| inner.on_discovered(cx));
    }

    pub(crate) fn on_rediscovered(&self, core: &Core) {
        self.locked(core, |inner, cx| inner.on_rediscovered(cx));
    }

    pub(crate) fn on_undiscovered(&self, core: &Core) {
        self.locked(core, |inner, cx| inner.on_undiscovered(cx));
    }

    pub(crate) fn on_radio_off(&self, core: &Core) {
        self.locked(core, |inner, cx| inner.on_radio_off(cx));
    }

    fn locked<R>(&self, core: &Core, f: impl FnOnce(&mut DeviceInner, &Cx<'_>) -> R) -> R {
        let mut inner = self.inner.lock();
        let cx = Cx::new(core, &self.id);
        f(&mut inner, &cx)
    }

    /// Public entry: lock, act, then settle reports and listeners lock-free.
    fn run<R>(&self, f: impl FnOnce(&mut DeviceInner, &Cx<'_>) -> R) -> Option<R> {
        let core = self.core.upgrade()?;
        let out = self.locked(&core, f);
        core.settle();
        Some(out)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("state", &crate::state::describe::<DeviceState>(self.mask()))
            .finish()
    }
}
