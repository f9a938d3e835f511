//! # Per-device condition flags.
//!
//! Flags overlap freely: a device is typically `DISCOVERED | BONDED |
//! CONNECTING_OVERALL | CONNECTED | GETTING_SERVICES` mid-connection. The
//! tracker does not police combinations; the device code applies whole
//! clusters at once (see [`DeviceState::disconnected_cluster`]).
//!
//! ## Connection phases
//! ```text
//! DISCONNECTED
//!   └─► CONNECTING_OVERALL ─┬─ CONNECTING            (native connect in flight)
//!                           ├─ CONNECTED              (link up)
//!                           ├─ BONDING                (optional auto-bond)
//!                           ├─ GETTING_SERVICES
//!                           ├─ AUTHENTICATING ─► AUTHENTICATED
//!                           └─ INITIALIZING
//!   └─► INITIALIZED        (CONNECTING_OVERALL cleared)
//! ```

use super::State;

/// Conditions a device can be in at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    /// Removed from discovery; the record is about to be dropped.
    Undiscovered,
    /// Seen by discovery at least once and not undiscovered since.
    Discovered,
    /// Believed to be advertising (not connected and not reconnecting).
    Advertising,
    /// No link, no connection attempt.
    Disconnected,
    Bonding,
    Bonded,
    Unbonded,
    /// The reconnect loop is running for this device.
    AttemptingReconnect,
    /// Anywhere between the first connect request and full initialization.
    ConnectingOverall,
    /// Native connect issued, link not yet up.
    Connecting,
    Connected,
    GettingServices,
    Authenticating,
    Authenticated,
    Initializing,
    /// Connection pipeline finished; reads, writes and polls may flow.
    Initialized,
    UpdatingFirmware,
}

impl DeviceState {
    /// Bond flags, mutually exclusive.
    pub const BOND: [DeviceState; 3] = [
        DeviceState::Bonding,
        DeviceState::Bonded,
        DeviceState::Unbonded,
    ];

    /// Flags that mean "a link is up or being brought up".
    pub const CONNECTING_OR_CONNECTED: [DeviceState; 3] = [
        DeviceState::Connected,
        DeviceState::Connecting,
        DeviceState::ConnectingOverall,
    ];

    /// Whole-mask assignment applied whenever the device lands disconnected.
    ///
    /// Every flag not named here is cleared by [`StateTracker::set`](super::StateTracker::set).
    pub fn disconnected_cluster(
        bond: DeviceState,
        attempting_reconnect: bool,
    ) -> Vec<(DeviceState, bool)> {
        let mut cluster = vec![
            (DeviceState::Discovered, true),
            (DeviceState::Disconnected, true),
            (DeviceState::AttemptingReconnect, attempting_reconnect),
            (DeviceState::Advertising, !attempting_reconnect),
        ];
        for b in DeviceState::BOND {
            cluster.push((b, b == bond));
        }
        cluster
    }
}

impl State for DeviceState {
    const ALL: &'static [Self] = &[
        DeviceState::Undiscovered,
        DeviceState::Discovered,
        DeviceState::Advertising,
        DeviceState::Disconnected,
        DeviceState::Bonding,
        DeviceState::Bonded,
        DeviceState::Unbonded,
        DeviceState::AttemptingReconnect,
        DeviceState::ConnectingOverall,
        DeviceState::Connecting,
        DeviceState::Connected,
        DeviceState::GettingServices,
        DeviceState::Authenticating,
        DeviceState::Authenticated,
        DeviceState::Initializing,
        DeviceState::Initialized,
        DeviceState::UpdatingFirmware,
    ];

    fn ordinal(self) -> u32 {
        self as u32
    }

    fn name(self) -> &'static str {
        match self {
            DeviceState::Undiscovered => "UNDISCOVERED",
            DeviceState::Discovered => "DISCOVERED",
            DeviceState::Advertising => "ADVERTISING",
            DeviceState::Disconnected => "DISCONNECTED",
            DeviceState::Bonding => "BONDING",
            DeviceState::Bonded => "BONDED",
            DeviceState::Unbonded => "UNBONDED",
            DeviceState::AttemptingReconnect => "ATTEMPTING_RECONNECT",
            DeviceState::ConnectingOverall => "CONNECTING_OVERALL",
            DeviceState::Connecting => "CONNECTING",
            DeviceState::Connected => "CONNECTED",
            DeviceState::GettingServices => "GETTING_SERVICES",
            DeviceState::Authenticating => "AUTHENTICATING",
            DeviceState::Authenticated => "AUTHENTICATED",
            DeviceState::Initializing => "INITIALIZING",
            DeviceState::Initialized => "INITIALIZED",
            DeviceState::UpdatingFirmware => "UPDATING_FIRMWARE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_follow_ordinal() {
        for (i, s) in DeviceState::ALL.iter().enumerate() {
            assert_eq!(s.bit(), 1 << i, "{s:?}");
        }
    }

    #[test]
    fn test_disconnected_cluster_reconnecting() {
        let cluster = DeviceState::disconnected_cluster(DeviceState::Bonded, true);
        let on: Vec<DeviceState> = cluster.iter().filter(|(_, v)| *v).map(|(s, _)| *s).collect();
        assert!(on.contains(&DeviceState::AttemptingReconnect));
        assert!(on.contains(&DeviceState::Bonded));
        assert!(!on.contains(&DeviceState::Advertising));
        assert!(!on.contains(&DeviceState::Unbonded));
    }
}
