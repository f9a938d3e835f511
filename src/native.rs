//! # Native radio boundary.
//!
//! The core never talks to a Bluetooth stack directly. It drives a
//! [`NativeRadio`] whose entry points return an immediate accept/reject
//! boolean, and it receives the matching asynchronous completion later as a
//! [`NativeEvent`] through [`Manager::on_native_event`](crate::Manager::on_native_event).
//!
//! ```text
//!  Scheduler ──execute()──► NativeRadio::read(dev, uuid) ──► false ─► FAILED (immediately)
//!                                   │
//!                                   └─► true ─► EXECUTING
//!                                                  ▲
//!  Manager::on_native_event(dev, ReadComplete{..}) ┘  (exactly one per accepted call,
//!                                                       or never: timeout path)
//! ```
//!
//! ## Rules
//! - Entry points must not block and must not call back into the manager
//!   synchronously; completions are always delivered through `on_native_event`.
//! - Completions that arrive after the operation ended are ignored.
//! - A `Disconnected` event with no preceding operation is legal (rogue drop).

use enumset::EnumSet;
use uuid::Uuid;

use crate::device::DeviceId;

/// GATT status code for success.
pub const GATT_SUCCESS: i32 = 0;

/// Client Characteristic Configuration Descriptor.
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x0000_2902_0000_1000_8000_0080_5f9b_34fb);

/// CCCD value enabling notifications.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
/// CCCD value enabling indications.
pub const ENABLE_INDICATION_VALUE: [u8; 2] = [0x02, 0x00];
/// CCCD value disabling both.
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

/// Characteristic property flags as advertised by the peripheral.
#[derive(Debug, enumset::EnumSetType)]
pub enum CharProperty {
    Broadcast,
    Read,
    WriteWithoutResponse,
    Write,
    Notify,
    Indicate,
    SignedWrite,
    ExtendedProps,
}

/// A discovered characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub properties: EnumSet<CharProperty>,
}

impl Characteristic {
    pub fn new(uuid: Uuid, properties: EnumSet<CharProperty>) -> Self {
        Self { uuid, properties }
    }

    /// CCCD value to write when toggling pushes on this characteristic.
    ///
    /// Notify wins over indicate when both are supported.
    pub fn toggle_value(&self, enable: bool) -> [u8; 2] {
        if !enable {
            DISABLE_NOTIFICATION_VALUE
        } else if self.properties.contains(CharProperty::Notify)
            || !self.properties.contains(CharProperty::Indicate)
        {
            ENABLE_NOTIFICATION_VALUE
        } else {
            ENABLE_INDICATION_VALUE
        }
    }
}

/// Native bond state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondState {
    None,
    Bonding,
    Bonded,
}

/// A pending GATT-server request the application answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRequest {
    /// Remote client the response goes to.
    pub device: DeviceId,
    pub request_id: u32,
    pub offset: u32,
    /// GATT status to answer with.
    pub status: i32,
    pub data: Vec<u8>,
}

/// Asynchronous completions and unsolicited events from the native stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeEvent {
    Connected,
    ConnectFailed { status: i32 },
    Disconnected { status: i32 },
    ServicesDiscovered { status: i32 },
    ReadComplete { uuid: Uuid, status: i32, value: Vec<u8> },
    WriteComplete { uuid: Uuid, status: i32 },
    DescriptorWritten { uuid: Uuid, descriptor: Uuid, status: i32 },
    BondStateChanged { state: BondState, status: i32 },
    /// Value pushed by the peripheral (notification or indication).
    Notification { uuid: Uuid, value: Vec<u8> },
}

impl NativeEvent {
    pub fn label(&self) -> &'static str {
        match self {
            NativeEvent::Connected => "connected",
            NativeEvent::ConnectFailed { .. } => "connect_failed",
            NativeEvent::Disconnected { .. } => "disconnected",
            NativeEvent::ServicesDiscovered { .. } => "services_discovered",
            NativeEvent::ReadComplete { .. } => "read_complete",
            NativeEvent::WriteComplete { .. } => "write_complete",
            NativeEvent::DescriptorWritten { .. } => "descriptor_written",
            NativeEvent::BondStateChanged { .. } => "bond_state_changed",
            NativeEvent::Notification { .. } => "notification",
        }
    }
}

/// Synchronous entry points of the native radio stack.
///
/// Every `bool` return is the immediate accept (`true`) or reject (`false`)
/// of the call. An accepted call produces at most one [`NativeEvent`].
pub trait NativeRadio: Send + Sync + 'static {
    fn connect(&self, device: &DeviceId, auto_connect: bool) -> bool;
    fn disconnect(&self, device: &DeviceId) -> bool;
    /// Releases the native connection handle without waiting for a callback.
    fn close(&self, device: &DeviceId);
    fn is_connected(&self, device: &DeviceId) -> bool;

    fn discover_services(&self, device: &DeviceId) -> bool;
    /// Characteristics found by the last successful discovery.
    fn characteristics(&self, device: &DeviceId) -> Vec<Characteristic>;

    fn read(&self, device: &DeviceId, uuid: Uuid) -> bool;
    fn write(&self, device: &DeviceId, uuid: Uuid, data: &[u8]) -> bool;
    fn set_characteristic_notification(&self, device: &DeviceId, uuid: Uuid, enable: bool) -> bool;
    fn has_descriptor(&self, device: &DeviceId, uuid: Uuid, descriptor: Uuid) -> bool;
    fn write_descriptor(&self, device: &DeviceId, uuid: Uuid, descriptor: Uuid, value: &[u8])
    -> bool;

    fn bond(&self, device: &DeviceId) -> bool;
    fn unbond(&self, device: &DeviceId) -> bool;
    fn bond_state(&self, device: &DeviceId) -> BondState;

    /// Answers a GATT-server request. No completion event follows.
    fn send_response(&self, request: &ResponseRequest) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_value_prefers_notify() {
        let both = Characteristic::new(
            Uuid::nil(),
            CharProperty::Notify | CharProperty::Indicate,
        );
        assert_eq!(both.toggle_value(true), ENABLE_NOTIFICATION_VALUE);

        let indicate = Characteristic::new(Uuid::nil(), EnumSet::only(CharProperty::Indicate));
        assert_eq!(indicate.toggle_value(true), ENABLE_INDICATION_VALUE);
        assert_eq!(indicate.toggle_value(false), DISABLE_NOTIFICATION_VALUE);
    }

    #[test]
    fn test_cccd_uuid() {
        assert_eq!(
            CCCD_UUID.to_string(),
            "00002902-0000-1000-8000-00805f9b34fb"
        );
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::Mutex;

    use super::*;

    /// Scriptable in-crate radio for unit tests.
    pub(crate) struct FakeRadio {
        accept: AtomicBool,
        has_descriptor: AtomicBool,
        connected: Mutex<HashSet<DeviceId>>,
        bond: Mutex<BondState>,
        chars: Mutex<Vec<Characteristic>>,
        calls: Mutex<Vec<String>>,
    }

    impl Default for FakeRadio {
        fn default() -> Self {
            Self {
                accept: AtomicBool::new(true),
                has_descriptor: AtomicBool::new(true),
                connected: Mutex::new(HashSet::new()),
                bond: Mutex::new(BondState::None),
                chars: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl FakeRadio {
        pub(crate) fn rejecting() -> Self {
            let radio = Self::default();
            radio.accept.store(false, Ordering::SeqCst);
            radio
        }

        pub(crate) fn set_has_descriptor(&self, v: bool) {
            self.has_descriptor.store(v, Ordering::SeqCst);
        }

        pub(crate) fn set_connected(&self, device: &DeviceId, v: bool) {
            let mut set = self.connected.lock();
            if v {
                set.insert(device.clone());
            } else {
                set.remove(device);
            }
        }

        pub(crate) fn set_characteristics(&self, chars: Vec<Characteristic>) {
            *self.chars.lock() = chars;
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn record(&self, call: &str) -> bool {
            self.calls.lock().push(call.to_string());
            self.accept.load(Ordering::SeqCst)
        }
    }

    impl NativeRadio for FakeRadio {
        fn connect(&self, _device: &DeviceId, _auto_connect: bool) -> bool {
            self.record("connect")
        }
        fn disconnect(&self, _device: &DeviceId) -> bool {
            self.record("disconnect")
        }
        fn close(&self, _device: &DeviceId) {
            self.record("close");
        }
        fn is_connected(&self, device: &DeviceId) -> bool {
            self.connected.lock().contains(device)
        }
        fn discover_services(&self, _device: &DeviceId) -> bool {
            self.record("discover_services")
        }
        fn characteristics(&self, _device: &DeviceId) -> Vec<Characteristic> {
            self.chars.lock().clone()
        }
        fn read(&self, _device: &DeviceId, _uuid: Uuid) -> bool {
            self.record("read")
        }
        fn write(&self, _device: &DeviceId, _uuid: Uuid, _data: &[u8]) -> bool {
            self.record("write")
        }
        fn set_characteristic_notification(&self, _d: &DeviceId, _u: Uuid, _e: bool) -> bool {
            self.record("set_characteristic_notification")
        }
        fn has_descriptor(&self, _d: &DeviceId, _u: Uuid, _desc: Uuid) -> bool {
            self.has_descriptor.load(Ordering::SeqCst)
        }
        fn write_descriptor(&self, _d: &DeviceId, _u: Uuid, _desc: Uuid, _v: &[u8]) -> bool {
            self.record("write_descriptor")
        }
        fn bond(&self, _device: &DeviceId) -> bool {
            self.record("bond")
        }
        fn unbond(&self, _device: &DeviceId) -> bool {
            self.record("unbond")
        }
        fn bond_state(&self, _device: &DeviceId) -> BondState {
            *self.bond.lock()
        }
        fn send_response(&self, _request: &ResponseRequest) -> bool {
            self.record("send_response")
        }
    }
}
