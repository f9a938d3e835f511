use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::Config;
use crate::device::{Device, DeviceId};
use crate::error::{CancelCause, ManagerError};
use crate::events::{Event, EventKind};
use crate::native::{NativeEvent, ResponseRequest};
use crate::operation::{Operation, OperationId, OperationKind, Target};
use crate::scheduler::SchedulerSnapshot;
use crate::state::{ManagerState, State, StateListener, describe};
use crate::subscribers::{Subscribe, SubscriberSet};

use super::core::{Core, ResponseListener};
use super::pump::CallbackPump;

/// Owner of the scheduler and every device record.
///
/// Created by [`ManagerBuilder`](super::ManagerBuilder). The manager is
/// driven from outside: native callbacks enter through
/// [`on_native_event`](Self::on_native_event), time through
/// [`tick`](Self::tick) (or [`spawn_ticker`](Self::spawn_ticker)), radio power
/// through [`on_radio_state`](Self::on_radio_state).
pub struct Manager {
    core: Arc<Core>,
    subs: Option<Arc<SubscriberSet>>,
    pump: Mutex<Option<CallbackPump>>,
    /// Stops the subscriber listener when the manager is dropped.
    token: CancellationToken,
}

impl Manager {
    pub(super) fn new_internal(
        core: Arc<Core>,
        subscribers: Vec<Arc<dyn Subscribe>>,
        pump: Option<CallbackPump>,
    ) -> Self {
        let token = CancellationToken::new();
        let subs = if subscribers.is_empty() {
            None
        } else {
            let set = Arc::new(SubscriberSet::new(subscribers, &core.bus));
            Self::subscriber_listener(&core, Arc::clone(&set), token.clone());
            Some(set)
        };
        Self {
            core,
            subs,
            pump: Mutex::new(pump),
            token,
        }
    }

    /// Forwards bus events to the subscriber set until `token` is cancelled.
    ///
    /// Events still buffered in the bus at cancellation are not forwarded.
    fn subscriber_listener(core: &Core, set: Arc<SubscriberSet>, token: CancellationToken) {
        let mut rx = core.bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    res = rx.recv() => match res {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "subscriber listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    },
                }
            }
        });
    }

    pub fn config(&self) -> &Config {
        &self.core.cfg
    }

    /// Receiver of every bus event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.core.bus.subscribe()
    }

    /// Hands out the redispatch pump once. `None` unless callbacks are posted.
    pub fn take_callback_pump(&self) -> Option<CallbackPump> {
        self.pump.lock().take()
    }

    // ---- discovery ----

    /// Creates the device record, or refreshes it if it already exists.
    pub fn discover(&self, id: impl Into<DeviceId>) -> Arc<Device> {
        let id = id.into();
        let (device, fresh) = {
            let mut devices = self.core.devices.write();
            match devices.get(&id) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let device = Device::new(id.clone(), &self.core);
                    devices.insert(id.clone(), Arc::clone(&device));
                    (device, true)
                }
            }
        };

        if fresh {
            self.core
                .bus
                .publish(Event::new(EventKind::DeviceDiscovered).with_device(id.as_arc()));
            debug!(device = %id, "discovered");
            device.on_discovered(&self.core);
        } else {
            self.core
                .bus
                .publish(Event::new(EventKind::DeviceRediscovered).with_device(id.as_arc()));
            trace!(device = %id, "rediscovered");
            device.on_rediscovered(&self.core);
        }
        self.core.settle();
        device
    }

    /// Tears the device down and forgets it.
    ///
    /// # Errors
    /// [`ManagerError::UnknownDevice`] if `id` has no record.
    pub fn undiscover(&self, id: &DeviceId) -> Result<(), ManagerError> {
        let device = self
            .core
            .device(id)
            .ok_or_else(|| ManagerError::UnknownDevice { id: id.clone() })?;
        device.on_undiscovered(&self.core);
        self.core.settle();

        self.core.devices.write().remove(id);
        self.core
            .bus
            .publish(Event::new(EventKind::DeviceUndiscovered).with_device(id.as_arc()));
        debug!(device = %id, "undiscovered");
        Ok(())
    }

    pub fn device(&self, id: &DeviceId) -> Option<Arc<Device>> {
        self.core.device(id)
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.core.devices.read().values().cloned().collect()
    }

    // ---- external drivers ----

    /// Advances time: operation timeouts first, then every device's
    /// reconnect, poll and transaction clocks.
    pub fn tick(&self, elapsed: Duration) {
        self.core
            .scheduler
            .lock()
            .tick(elapsed, self.core.radio.as_ref());
        self.core.settle();

        for device in self.devices() {
            device.tick(&self.core, elapsed);
        }
        self.core.settle();
    }

    /// Feeds one native callback for `device`.
    pub fn on_native_event(&self, device: &DeviceId, event: NativeEvent) {
        match self.core.device(device) {
            Some(record) => record.on_native_event(&self.core, &event),
            None => debug!(%device, event = event.label(), "callback for unknown device ignored"),
        }
        self.core.settle();
    }

    /// Applies an adapter power state.
    ///
    /// Going down soft-cancels every operation and drops every link.
    pub fn on_radio_state(&self, state: ManagerState) {
        let mut pairs: Vec<(ManagerState, bool)> = ManagerState::POWER
            .iter()
            .map(|&s| (s, s == state))
            .collect();
        if state.is_radio_down() {
            pairs.push((ManagerState::Scanning, false));
        }
        self.update_radio(&pairs);

        if state.is_radio_down() {
            let n = self.core.cancel(|_| true, CancelCause::RadioOff);
            info!(state = state.name(), cancelled = n, "radio going down");
            for device in self.devices() {
                device.on_radio_off(&self.core);
            }
        }
        self.core.settle();
    }

    /// Sets or clears the scanning bit.
    pub fn set_scanning(&self, scanning: bool) {
        self.update_radio(&[(ManagerState::Scanning, scanning)]);
        self.core.settle();
    }

    fn update_radio(&self, pairs: &[(ManagerState, bool)]) {
        let Some(change) = self.core.radio_state.lock().update(pairs) else {
            return;
        };
        debug!(state = %describe::<ManagerState>(change.new), "radio state changed");
        self.core.bus.publish(
            Event::new(EventKind::RadioStateChanged).with_masks(change.old, change.new),
        );
        if let Some(listener) = self.core.radio_listener.lock().clone() {
            self.core.post(Box::new(move || listener(&change)));
        }
    }

    pub fn set_radio_state_listener(&self, listener: Option<StateListener<ManagerState>>) {
        *self.core.radio_listener.lock() = listener;
    }

    /// Current radio state bitmask.
    pub fn radio_mask(&self) -> u32 {
        self.core.radio_state.lock().mask()
    }

    pub fn is(&self, state: ManagerState) -> bool {
        self.core.radio_state.lock().is(state)
    }

    // ---- peripheral role ----

    /// Schedules an answer to a GATT-server request.
    ///
    /// The listener receives the final report: `Succeeded` half a second
    /// after the native call was accepted, `Failed` if it was rejected,
    /// `SoftlyCancelled` if pre-empted.
    pub fn send_response(
        &self,
        request: ResponseRequest,
        listener: Option<ResponseListener>,
    ) -> OperationId {
        let op = Operation::new(Target::Manager, OperationKind::SendResponse { request })
            .with_timeout(self.core.cfg.operation_timeout_opt());
        let id = self.core.submit(op);
        if let Some(listener) = listener {
            self.core.responses.lock().insert(id, listener);
        }
        self.core.settle();
        id
    }

    // ---- introspection ----

    pub fn scheduler_snapshot(&self) -> SchedulerSnapshot {
        self.core.scheduler.lock().snapshot()
    }

    // ---- lifecycle ----

    /// Drives [`tick`](Self::tick) from a tokio interval until `token` is cancelled.
    pub fn spawn_ticker(self: &Arc<Self>, period: Duration, token: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    now = interval.tick() => {
                        manager.tick(now - last);
                        last = now;
                    }
                }
            }
        })
    }

    /// Cancels every operation and stops every reconnect loop.
    ///
    /// Dropping the manager stops the subscriber listener. Workers then drain
    /// their queues and exit.
    pub fn shutdown(&self) {
        let n = self.core.cancel(|_| true, CancelCause::Explicit);
        for device in self.devices() {
            device.on_radio_off(&self.core);
        }
        self.core.settle();
        info!(cancelled = n, subscribers = self.subs.is_some(), "manager shut down");
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("devices", &self.core.devices.read().len())
            .field("scheduled", &self.core.scheduler.lock().len())
            .field("radio", &describe::<ManagerState>(self.radio_mask()))
            .finish()
    }
}
