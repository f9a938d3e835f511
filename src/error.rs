//! Error types produced by operations and by the manager surface.
//!
//! This module defines two main error enums:
//!
//! - [`OperationError`]: why a scheduled radio operation did not succeed.
//! - [`ManagerError`]: misuse of the manager or device API.
//!
//! Both provide `as_label` for logs/events.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::device::DeviceId;

/// Higher-level event that pre-empted an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The device disconnected (explicitly or not).
    Disconnect,
    /// The adapter is turning off or is off.
    RadioOff,
    /// A newer operation made this one pointless (e.g. connect vs disconnect).
    Superseded,
    /// The device was removed from discovery.
    Undiscovered,
    /// Caller asked for it.
    Explicit,
}

impl CancelCause {
    pub fn as_label(&self) -> &'static str {
        match self {
            CancelCause::Disconnect => "disconnect",
            CancelCause::RadioOff => "radio_off",
            CancelCause::Superseded => "superseded",
            CancelCause::Undiscovered => "undiscovered",
            CancelCause::Explicit => "explicit",
        }
    }
}

/// # Why an operation did not succeed.
///
/// Immediate rejection and eventual failure both end in `FAILED` but stay
/// distinct here; soft cancellation is never a native failure.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// The native call returned `false` synchronously.
    #[error("native stack rejected the call")]
    FailedImmediately,

    /// Enabling or disabling notifications on the characteristic was refused.
    #[error("native stack refused to toggle notifications")]
    FailedToToggleNotification,

    /// The native callback arrived with a non-success status.
    #[error("native callback reported status {status}")]
    FailedEventually {
        /// Raw GATT status code.
        status: i32,
    },

    /// No callback within the configured duration.
    #[error("timed out after {timeout:?}")]
    TimedOut {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// Pre-empted by a lifecycle event.
    #[error("cancelled ({})", .cause.as_label())]
    Cancelled {
        /// What pre-empted the operation.
        cause: CancelCause,
    },

    /// The requested characteristic is not present on the device.
    #[error("no characteristic {uuid}")]
    NoMatchingTarget {
        /// Characteristic that was looked up.
        uuid: Uuid,
    },

    /// The device has no link.
    #[error("device not connected")]
    NotConnected,
}

impl OperationError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    ///
    /// # Example
    /// ```
    /// use gattvisor::OperationError;
    ///
    /// let err = OperationError::FailedEventually { status: 133 };
    /// assert_eq!(err.as_label(), "op_failed_eventually");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            OperationError::FailedImmediately => "op_failed_immediately",
            OperationError::FailedToToggleNotification => "op_failed_toggle_notify",
            OperationError::FailedEventually { .. } => "op_failed_eventually",
            OperationError::TimedOut { .. } => "op_timed_out",
            OperationError::Cancelled { .. } => "op_cancelled",
            OperationError::NoMatchingTarget { .. } => "op_no_matching_target",
            OperationError::NotConnected => "op_not_connected",
        }
    }
}

/// # Errors returned by the manager and device API.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    /// No record for this device (never discovered, or undiscovered).
    #[error("unknown device {id}")]
    UnknownDevice {
        /// The requested device.
        id: DeviceId,
    },

    /// The call needs a fully initialized connection.
    #[error("device {id} is not initialized")]
    NotInitialized {
        /// The device the call was made on.
        id: DeviceId,
    },

    /// A firmware update transaction is already running.
    #[error("device {id} is already updating firmware")]
    AlreadyUpdatingFirmware {
        /// The device the call was made on.
        id: DeviceId,
    },

    /// The manager was dropped while a device handle was still in use.
    #[error("manager is gone")]
    ManagerGone,

    /// Subscribers were configured but no tokio runtime is running.
    #[error("subscribers require a tokio runtime")]
    NoRuntime,
}

impl ManagerError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    pub fn as_label(&self) -> &'static str {
        match self {
            ManagerError::UnknownDevice { .. } => "manager_unknown_device",
            ManagerError::NotInitialized { .. } => "manager_not_initialized",
            ManagerError::AlreadyUpdatingFirmware { .. } => "manager_already_updating_firmware",
            ManagerError::ManagerGone => "manager_gone",
            ManagerError::NoRuntime => "manager_no_runtime",
        }
    }
}
