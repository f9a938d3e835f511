use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{error, trace, warn};

use crate::config::Config;
use crate::device::{Device, DeviceId};
use crate::error::CancelCause;
use crate::events::{Bus, Event, EventKind};
use crate::native::NativeRadio;
use crate::operation::{Operation, OperationId, Report, Target};
use crate::policies::{ConnectionFailPolicy, ReconnectPolicy};
use crate::scheduler::Scheduler;
use crate::state::{ManagerState, StateListener, StateTracker};

/// Deferred listener invocation.
pub(crate) type Callback = Box<dyn FnOnce() + Send>;

/// Receives the final report of a [`Manager::send_response`](crate::Manager::send_response).
pub type ResponseListener = Arc<dyn Fn(&Report) + Send + Sync>;

pub(crate) enum Dispatch {
    Inline,
    Posted(mpsc::UnboundedSender<Callback>),
}

/// State shared by the manager and every device handle.
///
/// Lock order: device, then scheduler. `outbox` and `responses` are leaf
/// locks held only for a push or pop.
pub(crate) struct Core {
    pub(crate) cfg: Config,
    pub(crate) radio: Arc<dyn NativeRadio>,
    pub(crate) scheduler: Mutex<Scheduler>,
    pub(crate) bus: Bus,
    pub(crate) fail_policy: Arc<dyn ConnectionFailPolicy>,
    pub(crate) reconnect_policy: Arc<dyn ReconnectPolicy>,
    pub(crate) devices: RwLock<HashMap<DeviceId, Arc<Device>>>,
    pub(crate) radio_state: Mutex<StateTracker<ManagerState>>,
    pub(crate) radio_listener: Mutex<Option<StateListener<ManagerState>>>,
    pub(crate) responses: Mutex<HashMap<OperationId, ResponseListener>>,
    outbox: Mutex<VecDeque<Callback>>,
    flushing: Mutex<()>,
    dispatch: Dispatch,
}

impl Core {
    pub(crate) fn new(
        cfg: Config,
        radio: Arc<dyn NativeRadio>,
        bus: Bus,
        fail_policy: Arc<dyn ConnectionFailPolicy>,
        reconnect_policy: Arc<dyn ReconnectPolicy>,
        dispatch: Dispatch,
    ) -> Self {
        Self {
            cfg,
            radio,
            scheduler: Mutex::new(Scheduler::new(bus.clone())),
            bus,
            fail_policy,
            reconnect_policy,
            devices: RwLock::new(HashMap::new()),
            radio_state: Mutex::new(StateTracker::new(&[ManagerState::Off])),
            radio_listener: Mutex::new(None),
            responses: Mutex::new(HashMap::new()),
            outbox: Mutex::new(VecDeque::new()),
            flushing: Mutex::new(()),
            dispatch,
        }
    }

    pub(crate) fn device(&self, id: &DeviceId) -> Option<Arc<Device>> {
        self.devices.read().get(id).cloned()
    }

    /// Enqueues and promotes.
    pub(crate) fn submit(&self, op: Operation) -> OperationId {
        let mut scheduler = self.scheduler.lock();
        let id = scheduler.submit(op);
        scheduler.pump(self.radio.as_ref());
        id
    }

    /// Soft-cancels matching operations and refills the execution slot.
    pub(crate) fn cancel<F>(&self, pred: F, cause: CancelCause) -> usize
    where
        F: Fn(&Operation) -> bool,
    {
        let mut scheduler = self.scheduler.lock();
        let n = scheduler.cancel(pred, cause);
        scheduler.pump(self.radio.as_ref());
        n
    }

    pub(crate) fn post(&self, callback: Callback) {
        self.outbox.lock().push_back(callback);
    }

    /// Reports a recovered inconsistency.
    pub(crate) fn diagnostic(&self, device: Option<&DeviceId>, message: &'static str) {
        error!(device = ?device.map(DeviceId::as_str), message, "diagnostic");
        let mut ev = Event::new(EventKind::Diagnostic).with_reason(message);
        if let Some(id) = device {
            ev = ev.with_device(id.as_arc());
        }
        self.bus.publish(ev);
    }

    /// Routes finished operations to their owners, then runs queued listeners.
    ///
    /// Must be called with no device or scheduler lock held.
    pub(crate) fn settle(&self) {
        loop {
            let reports = self.scheduler.lock().drain_reports();
            if reports.is_empty() {
                break;
            }
            for report in reports {
                self.route(report);
            }
        }
        self.flush();
    }

    fn route(&self, report: Report) {
        let device = match &report.target {
            Target::Device(id) => Some(id.clone()),
            Target::Manager => None,
        };
        match device {
            Some(id) => match self.device(&id) {
                Some(device) => device.on_report(self, report),
                None => trace!(op = %report.id, device = %id, "report for unknown device dropped"),
            },
            None => {
                let listener = self.responses.lock().remove(&report.id);
                if let Some(listener) = listener {
                    self.post(Box::new(move || listener(&report)));
                }
            }
        }
    }

    /// Single drainer: a re-entrant call returns at once and the active
    /// drain picks up whatever it queued.
    fn flush(&self) {
        loop {
            {
                let Some(_draining) = self.flushing.try_lock() else {
                    return;
                };
                loop {
                    let next = self.outbox.lock().pop_front();
                    let Some(callback) = next else {
                        break;
                    };
                    self.dispatch(callback);
                }
            }
            if self.outbox.lock().is_empty() {
                return;
            }
        }
    }

    fn dispatch(&self, callback: Callback) {
        match &self.dispatch {
            Dispatch::Inline => {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(callback)) {
                    let info = panic_message(panic.as_ref());
                    error!(%info, "listener panicked");
                    self.bus
                        .publish(Event::new(EventKind::Diagnostic).with_reason(format!("listener panicked: {info}")));
                }
            }
            Dispatch::Posted(tx) => {
                if tx.send(callback).is_err() {
                    warn!("callback pump dropped; listener call discarded");
                }
            }
        }
    }
}

pub(crate) fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
