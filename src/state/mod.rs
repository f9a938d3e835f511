//! Multi-bit state tracking.
//!
//! A device (or the radio manager) is usually in several conditions at once:
//! discovered *and* bonded *and* connecting, for instance. Each condition is a
//! named flag bound to one bit of a `u32` mask; a [`StateTracker`] owns the
//! mask and reports every change as a single [`StateChange`] delta.
//!
//! ## Contents
//! - [`State`] trait implemented by every flag enum (bit arithmetic helpers)
//! - [`StateTracker`] mask owner with batched `update` / whole-mask `set`
//! - [`StateChange`] immutable before/after snapshot handed to listeners
//! - [`DeviceState`] per-device flags
//! - [`ManagerState`] radio-wide flags
//!
//! ```text
//! update([(CONNECTED, true), (CONNECTING, false), (DISCONNECTED, false)])
//!     │
//!     ├─► new = apply(old, pairs)
//!     ├─► new == old ─► no-op, nothing emitted
//!     └─► new != old ─► listener(StateChange { old, new })   (exactly once)
//! ```

mod device_state;
mod manager_state;
mod tracker;

pub use device_state::DeviceState;
pub use manager_state::ManagerState;
pub use tracker::{StateChange, StateListener, StateTracker};

use std::fmt;

/// A named flag bound to one bit of a state mask.
///
/// Implementors only provide the ordinal table; the bit helpers are shared.
pub trait State: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Every variant, in ordinal order.
    const ALL: &'static [Self];

    /// Zero-based position of this flag in [`State::ALL`].
    fn ordinal(self) -> u32;

    /// Upper-case label used in logs.
    fn name(self) -> &'static str;

    /// The single bit this flag occupies.
    #[inline]
    fn bit(self) -> u32 {
        1 << self.ordinal()
    }

    /// True if this flag's bit is set in `mask`.
    #[inline]
    fn overlaps(self, mask: u32) -> bool {
        self.bit() & mask != 0
    }

    /// True iff the bit was 0 in `old` and is 1 in `new`.
    #[inline]
    fn was_entered(self, old: u32, new: u32) -> bool {
        !self.overlaps(old) && self.overlaps(new)
    }

    /// True iff the bit was 1 in `old` and is 0 in `new`.
    #[inline]
    fn was_exited(self, old: u32, new: u32) -> bool {
        self.overlaps(old) && !self.overlaps(new)
    }

    /// Combined mask of the given flags.
    fn mask_of(states: &[Self]) -> u32 {
        states.iter().fold(0, |acc, s| acc | s.bit())
    }

    /// Flags whose bits are set in `mask`, in ordinal order.
    fn decode(mask: u32) -> Vec<Self> {
        Self::ALL.iter().copied().filter(|s| s.overlaps(mask)).collect()
    }
}

/// Renders a mask as `A|B|C` using flag names.
pub fn describe<S: State>(mask: u32) -> String {
    let names: Vec<&'static str> = S::decode(mask).into_iter().map(State::name).collect();
    if names.is_empty() {
        "<none>".to_string()
    } else {
        names.join("|")
    }
}
