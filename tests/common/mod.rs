#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use enumset::EnumSet;
use gattvisor::{
    BondState, CharProperty, Characteristic, Config, DeviceId, Event, EventKind, Manager,
    ManagerBuilder, NativeRadio, ResponseRequest,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

pub const BATTERY: Uuid = Uuid::from_u128(0x2a19);
pub const HEART_RATE: Uuid = Uuid::from_u128(0x2a37);

/// Scripted radio: accepts every call, records it, and never calls back.
/// Tests feed completions through `Manager::on_native_event`.
pub struct MockRadio {
    accept: AtomicBool,
    connected: Mutex<HashSet<DeviceId>>,
    bond: Mutex<BondState>,
    chars: Mutex<Vec<Characteristic>>,
    calls: Mutex<Vec<String>>,
}

impl Default for MockRadio {
    fn default() -> Self {
        Self {
            accept: AtomicBool::new(true),
            connected: Mutex::new(HashSet::new()),
            bond: Mutex::new(BondState::None),
            chars: Mutex::new(vec![
                Characteristic::new(BATTERY, CharProperty::Read | CharProperty::Notify),
                Characteristic::new(HEART_RATE, EnumSet::only(CharProperty::Write)),
            ]),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockRadio {
    pub fn set_accept(&self, v: bool) {
        self.accept.store(v, Ordering::SeqCst);
    }

    pub fn set_connected(&self, device: &DeviceId, v: bool) {
        let mut set = self.connected.lock();
        if v {
            set.insert(device.clone());
        } else {
            set.remove(device);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == call).count()
    }

    fn record(&self, call: &str) -> bool {
        self.calls.lock().push(call.to_string());
        self.accept.load(Ordering::SeqCst)
    }
}

impl NativeRadio for MockRadio {
    fn connect(&self, _: &DeviceId, _: bool) -> bool {
        self.record("connect")
    }
    fn disconnect(&self, _: &DeviceId) -> bool {
        self.record("disconnect")
    }
    fn close(&self, device: &DeviceId) {
        self.record("close");
        self.connected.lock().remove(device);
    }
    fn is_connected(&self, device: &DeviceId) -> bool {
        self.connected.lock().contains(device)
    }
    fn discover_services(&self, _: &DeviceId) -> bool {
        self.record("discover_services")
    }
    fn characteristics(&self, _: &DeviceId) -> Vec<Characteristic> {
        self.chars.lock().clone()
    }
    fn read(&self, _: &DeviceId, _: Uuid) -> bool {
        self.record("read")
    }
    fn write(&self, _: &DeviceId, _: Uuid, _: &[u8]) -> bool {
        self.record("write")
    }
    fn set_characteristic_notification(&self, _: &DeviceId, _: Uuid, _: bool) -> bool {
        self.record("set_notification")
    }
    fn has_descriptor(&self, _: &DeviceId, _: Uuid, _: Uuid) -> bool {
        true
    }
    fn write_descriptor(&self, _: &DeviceId, _: Uuid, _: Uuid, _: &[u8]) -> bool {
        self.record("write_descriptor")
    }
    fn bond(&self, _: &DeviceId) -> bool {
        self.record("bond")
    }
    fn unbond(&self, _: &DeviceId) -> bool {
        self.record("unbond")
    }
    fn bond_state(&self, _: &DeviceId) -> BondState {
        *self.bond.lock()
    }
    fn send_response(&self, _: &ResponseRequest) -> bool {
        self.record("send_response")
    }
}

pub fn manager(cfg: Config) -> (Arc<Manager>, Arc<MockRadio>) {
    let radio = Arc::new(MockRadio::default());
    let manager = ManagerBuilder::new(cfg, radio.clone())
        .build()
        .expect("no subscribers, no runtime needed");
    (manager, radio)
}

/// Every event currently buffered in `rx`.
pub fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

pub fn of_kind(events: &[Event], kind: EventKind) -> Vec<&Event> {
    events.iter().filter(|e| e.kind == kind).collect()
}
