use uuid::Uuid;

use crate::device::DeviceId;
use crate::native::ResponseRequest;

use super::Priority;

/// What an operation acts on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Device(DeviceId),
    /// The radio manager itself (GATT-server responses).
    Manager,
}

impl Target {
    pub fn device(&self) -> Option<&DeviceId> {
        match self {
            Target::Device(id) => Some(id),
            Target::Manager => None,
        }
    }
}

/// Which GATT attribute a read/write result refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattTarget {
    Characteristic,
    Descriptor,
}

/// Why a read was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadKind {
    /// Requested by the application or a transaction.
    Read,
    /// Periodic poll.
    Poll,
    /// Forced read standing in for a silent notification.
    PseudoNotification,
}

/// The closed set of radio operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    Connect { auto_connect: bool },
    Disconnect,
    Bond { part_of_connection: bool },
    Unbond,
    DiscoverServices,
    Read { uuid: Uuid, kind: ReadKind },
    Write { uuid: Uuid, data: Vec<u8> },
    /// Writes `value` to the CCCD after toggling the local subscription.
    ToggleNotify { uuid: Uuid, enable: bool, value: [u8; 2] },
    SendResponse { request: ResponseRequest },
}

impl OperationKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            OperationKind::Connect { .. } => "connect",
            OperationKind::Disconnect => "disconnect",
            OperationKind::Bond { .. } => "bond",
            OperationKind::Unbond => "unbond",
            OperationKind::DiscoverServices => "discover_services",
            OperationKind::Read { .. } => "read",
            OperationKind::Write { .. } => "write",
            OperationKind::ToggleNotify { .. } => "toggle_notify",
            OperationKind::SendResponse { .. } => "send_response",
        }
    }

    /// Characteristic this operation addresses, if any.
    pub fn uuid(&self) -> Option<Uuid> {
        match self {
            OperationKind::Read { uuid, .. }
            | OperationKind::Write { uuid, .. }
            | OperationKind::ToggleNotify { uuid, .. } => Some(*uuid),
            _ => None,
        }
    }

    /// Reads, writes and notification toggles: the traffic a transaction lock holds back.
    pub fn is_read_write(&self) -> bool {
        matches!(
            self,
            OperationKind::Read { .. } | OperationKind::Write { .. } | OperationKind::ToggleNotify { .. }
        )
    }

    /// Operations that are meaningless without a link.
    pub fn requires_connection(&self) -> bool {
        matches!(
            self,
            OperationKind::Read { .. }
                | OperationKind::Write { .. }
                | OperationKind::ToggleNotify { .. }
                | OperationKind::DiscoverServices
                | OperationKind::Bond {
                    part_of_connection: true
                }
        )
    }

    /// Priority used when the submitter does not override it.
    pub fn default_priority(&self, explicit: bool) -> Priority {
        match self {
            OperationKind::Disconnect if explicit => Priority::Critical,
            OperationKind::Disconnect
            | OperationKind::Bond {
                part_of_connection: true,
            } => Priority::ForExplicitBondingAndConnecting,
            OperationKind::Connect { .. } | OperationKind::Bond { .. } | OperationKind::Unbond => {
                if explicit {
                    Priority::ForExplicitBondingAndConnecting
                } else {
                    Priority::Medium
                }
            }
            OperationKind::DiscoverServices => Priority::Medium,
            OperationKind::Read {
                kind: ReadKind::Poll | ReadKind::PseudoNotification,
                ..
            } => Priority::Low,
            OperationKind::Read { .. }
            | OperationKind::Write { .. }
            | OperationKind::ToggleNotify { .. }
            | OperationKind::SendResponse { .. } => Priority::ForNormalReadsWrites,
        }
    }
}
