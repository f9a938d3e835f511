use super::State;

/// Radio-wide conditions of the BLE adapter.
///
/// The first four mirror the native adapter power states; `Scanning` is set
/// while discovery is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerState {
    Off,
    TurningOn,
    On,
    TurningOff,
    Scanning,
}

impl ManagerState {
    /// The adapter power states, which are mutually exclusive.
    pub const POWER: [ManagerState; 4] = [
        ManagerState::Off,
        ManagerState::TurningOn,
        ManagerState::On,
        ManagerState::TurningOff,
    ];

    /// True for states in which no radio operation can complete.
    pub fn is_radio_down(self) -> bool {
        matches!(self, ManagerState::Off | ManagerState::TurningOff)
    }
}

impl State for ManagerState {
    const ALL: &'static [Self] = &[
        ManagerState::Off,
        ManagerState::TurningOn,
        ManagerState::On,
        ManagerState::TurningOff,
        ManagerState::Scanning,
    ];

    fn ordinal(self) -> u32 {
        self as u32
    }

    fn name(self) -> &'static str {
        match self {
            ManagerState::Off => "OFF",
            ManagerState::TurningOn => "TURNING_ON",
            ManagerState::On => "ON",
            ManagerState::TurningOff => "TURNING_OFF",
            ManagerState::Scanning => "SCANNING",
        }
    }
}
