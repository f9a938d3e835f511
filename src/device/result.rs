//! Read/write/notify outcomes delivered to application listeners.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::OperationError;
use crate::operation::{GattTarget, OperationState, ReadKind, Report};

use super::DeviceId;

/// Listener for [`ReadWriteResult`]s.
pub type ReadWriteListener = Arc<dyn Fn(&ReadWriteResult) + Send + Sync>;

/// What kind of traffic produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadWriteKind {
    Read,
    Write,
    /// Periodic read from a poll entry.
    Poll,
    /// Value pushed by the peripheral.
    Notification,
    /// Forced read standing in for a silent notification.
    PseudoNotification,
    EnablingNotification,
    DisablingNotification,
}

impl ReadWriteKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            ReadWriteKind::Read => "read",
            ReadWriteKind::Write => "write",
            ReadWriteKind::Poll => "poll",
            ReadWriteKind::Notification => "notification",
            ReadWriteKind::PseudoNotification => "pseudo_notification",
            ReadWriteKind::EnablingNotification => "enabling_notification",
            ReadWriteKind::DisablingNotification => "disabling_notification",
        }
    }

    /// Values arriving through a poll entry rather than a one-shot request.
    pub fn is_poll_or_notify(&self) -> bool {
        matches!(
            self,
            ReadWriteKind::Poll | ReadWriteKind::Notification | ReadWriteKind::PseudoNotification
        )
    }
}

impl From<ReadKind> for ReadWriteKind {
    fn from(kind: ReadKind) -> Self {
        match kind {
            ReadKind::Read => ReadWriteKind::Read,
            ReadKind::Poll => ReadWriteKind::Poll,
            ReadKind::PseudoNotification => ReadWriteKind::PseudoNotification,
        }
    }
}

/// Outcome classification of a [`ReadWriteResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadWriteStatus {
    Success,
    NoMatchingTarget,
    NotConnected,
    FailedImmediately,
    FailedToToggleNotification,
    /// The peripheral answered with a non-success GATT status.
    RemoteGattFailure,
    Cancelled,
    TimedOut,
}

impl ReadWriteStatus {
    pub fn as_label(&self) -> &'static str {
        match self {
            ReadWriteStatus::Success => "success",
            ReadWriteStatus::NoMatchingTarget => "no_matching_target",
            ReadWriteStatus::NotConnected => "not_connected",
            ReadWriteStatus::FailedImmediately => "failed_immediately",
            ReadWriteStatus::FailedToToggleNotification => "failed_to_toggle_notification",
            ReadWriteStatus::RemoteGattFailure => "remote_gatt_failure",
            ReadWriteStatus::Cancelled => "cancelled",
            ReadWriteStatus::TimedOut => "timed_out",
        }
    }
}

impl From<&OperationError> for ReadWriteStatus {
    fn from(err: &OperationError) -> Self {
        match err {
            OperationError::FailedImmediately => ReadWriteStatus::FailedImmediately,
            OperationError::FailedToToggleNotification => {
                ReadWriteStatus::FailedToToggleNotification
            }
            OperationError::FailedEventually { .. } => ReadWriteStatus::RemoteGattFailure,
            OperationError::TimedOut { .. } => ReadWriteStatus::TimedOut,
            OperationError::Cancelled { .. } => ReadWriteStatus::Cancelled,
            OperationError::NoMatchingTarget { .. } => ReadWriteStatus::NoMatchingTarget,
            OperationError::NotConnected => ReadWriteStatus::NotConnected,
        }
    }
}

/// Result record handed to read/write listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadWriteResult {
    pub device: DeviceId,
    pub uuid: Uuid,
    pub kind: ReadWriteKind,
    pub target: GattTarget,
    /// Value read or notified; empty for writes and failures.
    pub data: Vec<u8>,
    pub status: ReadWriteStatus,
    /// Native status for [`ReadWriteStatus::RemoteGattFailure`].
    pub gatt_status: Option<i32>,
    /// Queue wait plus execution.
    pub total_time: Duration,
    /// Execution only.
    pub transit_time: Duration,
}

impl ReadWriteResult {
    /// A request refused before it reached the scheduler.
    pub fn early_out(device: DeviceId, uuid: Uuid, kind: ReadWriteKind, err: &OperationError) -> Self {
        Self::blank(device, uuid, kind, ReadWriteStatus::from(err))
    }

    pub(crate) fn blank(device: DeviceId, uuid: Uuid, kind: ReadWriteKind, status: ReadWriteStatus) -> Self {
        Self {
            device,
            uuid,
            kind,
            target: GattTarget::Characteristic,
            data: Vec::new(),
            status,
            gatt_status: None,
            total_time: Duration::ZERO,
            transit_time: Duration::ZERO,
        }
    }

    /// A live notification.
    pub fn notification(device: DeviceId, uuid: Uuid, data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::blank(device, uuid, ReadWriteKind::Notification, ReadWriteStatus::Success)
        }
    }

    /// Builds the result for a finished read/write/toggle operation.
    pub(crate) fn from_report(device: DeviceId, uuid: Uuid, kind: ReadWriteKind, report: &Report) -> Self {
        let status = match (&report.error, report.state) {
            (_, OperationState::Succeeded) => ReadWriteStatus::Success,
            (Some(err), _) => ReadWriteStatus::from(err),
            (None, _) => ReadWriteStatus::FailedImmediately,
        };
        let gatt_status = match report.error {
            Some(OperationError::FailedEventually { status }) => Some(status),
            _ => None,
        };
        Self {
            device,
            uuid,
            kind,
            target: report.gatt_target,
            data: report.payload.clone().unwrap_or_default(),
            status,
            gatt_status,
            total_time: report.total_time,
            transit_time: report.transit_time,
        }
    }

    pub fn was_success(&self) -> bool {
        self.status == ReadWriteStatus::Success
    }

    pub fn was_cancelled(&self) -> bool {
        self.status == ReadWriteStatus::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CancelCause;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ReadWriteStatus::from(&OperationError::FailedEventually { status: 5 }),
            ReadWriteStatus::RemoteGattFailure
        );
        assert_eq!(
            ReadWriteStatus::from(&OperationError::Cancelled {
                cause: CancelCause::Disconnect
            }),
            ReadWriteStatus::Cancelled
        );
    }

    #[test]
    fn test_early_out_carries_the_refusal() {
        let uuid = Uuid::from_u128(7);
        let r = ReadWriteResult::early_out(
            DeviceId::from("d"),
            uuid,
            ReadWriteKind::Read,
            &OperationError::NoMatchingTarget { uuid },
        );
        assert_eq!(r.status, ReadWriteStatus::NoMatchingTarget);
        assert_eq!(r.target, GattTarget::Characteristic);
        assert_eq!(r.total_time, Duration::ZERO);
    }

    #[test]
    fn test_notification_result() {
        let r = ReadWriteResult::notification(DeviceId::from("d"), Uuid::nil(), vec![7]);
        assert!(r.was_success());
        assert_eq!(r.kind, ReadWriteKind::Notification);
        assert_eq!(r.data, vec![7]);
    }

    #[test]
    fn test_poll_kinds() {
        assert!(ReadWriteKind::from(ReadKind::Poll).is_poll_or_notify());
        assert!(!ReadWriteKind::Write.is_poll_or_notify());
    }
}
