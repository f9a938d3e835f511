//! # StateTracker: bitmask owner with delta notification.
//!
//! [`StateTracker`] is a plain data structure. It never fails and never locks;
//! the owner (a device or the manager) guards it with its own exclusive lock
//! so that exactly one update is visible at a time.
//!
//! ## Rules
//! - `update(pairs)` flips only the named bits.
//! - `set(pairs)` replaces the whole mask: named bits take the given values,
//!   every other bit is cleared.
//! - Each call that changes the mask produces exactly one [`StateChange`];
//!   a call that leaves the mask untouched produces none.
//! - The tracker does not reject contradictory combinations; callers pass
//!   internally consistent clusters.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::{State, describe};

/// Listener invoked with every delta a tracker produces.
pub type StateListener<S> = Arc<dyn Fn(&StateChange<S>) + Send + Sync>;

/// Immutable before/after snapshot of one tracker mutation.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct StateChange<S: State> {
    /// Mask before the mutation.
    pub old: u32,
    /// Mask after the mutation.
    pub new: u32,
    _flags: PhantomData<S>,
}

impl<S: State> StateChange<S> {
    pub fn new(old: u32, new: u32) -> Self {
        Self {
            old,
            new,
            _flags: PhantomData,
        }
    }

    #[inline]
    pub fn was_entered(&self, state: S) -> bool {
        state.was_entered(self.old, self.new)
    }

    #[inline]
    pub fn was_exited(&self, state: S) -> bool {
        state.was_exited(self.old, self.new)
    }

    /// True if `state` is set after the change.
    #[inline]
    pub fn is(&self, state: S) -> bool {
        state.overlaps(self.new)
    }

    /// Flags that went from 0 to 1.
    pub fn entered(&self) -> Vec<S> {
        S::decode(!self.old & self.new)
    }

    /// Flags that went from 1 to 0.
    pub fn exited(&self) -> Vec<S> {
        S::decode(self.old & !self.new)
    }
}

impl<S: State> fmt::Debug for StateChange<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateChange")
            .field("old", &describe::<S>(self.old))
            .field("new", &describe::<S>(self.new))
            .finish()
    }
}

/// Owner of one entity's state mask.
pub struct StateTracker<S: State> {
    mask: u32,
    listener: Option<StateListener<S>>,
}

impl<S: State> StateTracker<S> {
    /// Creates a tracker with the given flags set and no listener.
    pub fn new(initial: &[S]) -> Self {
        Self {
            mask: S::mask_of(initial),
            listener: None,
        }
    }

    /// Installs (or clears) the listener.
    pub fn set_listener(&mut self, listener: Option<StateListener<S>>) {
        self.listener = listener;
    }

    #[inline]
    pub fn mask(&self) -> u32 {
        self.mask
    }

    #[inline]
    pub fn is(&self, state: S) -> bool {
        state.overlaps(self.mask)
    }

    /// True if any of `states` is set.
    pub fn is_any(&self, states: &[S]) -> bool {
        S::mask_of(states) & self.mask != 0
    }

    /// True if every `(state, expected)` pair matches the current mask.
    pub fn is_all(&self, query: &[(S, bool)]) -> bool {
        query.iter().all(|&(s, v)| s.overlaps(self.mask) == v)
    }

    /// Applies a batch of bit assignments atomically.
    ///
    /// Later pairs win over earlier ones for the same flag.
    pub fn update(&mut self, pairs: &[(S, bool)]) -> Option<StateChange<S>> {
        let mut next = self.mask;
        for &(s, v) in pairs {
            if v {
                next |= s.bit();
            } else {
                next &= !s.bit();
            }
        }
        self.commit(next)
    }

    /// Replaces the entire mask with the flags set to `true` in `pairs`.
    pub fn set(&mut self, pairs: &[(S, bool)]) -> Option<StateChange<S>> {
        let next = pairs
            .iter()
            .filter(|(_, v)| *v)
            .fold(0u32, |acc, (s, _)| acc | s.bit());
        self.commit(next)
    }

    fn commit(&mut self, next: u32) -> Option<StateChange<S>> {
        if next == self.mask {
            return None;
        }
        let change = StateChange::new(self.mask, next);
        self.mask = next;
        if let Some(listener) = &self.listener {
            listener(&change);
        }
        Some(change)
    }
}

impl<S: State> fmt::Debug for StateTracker<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTracker")
            .field("mask", &describe::<S>(self.mask))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DeviceState as D;
    use parking_lot::Mutex;

    #[test]
    fn test_update_fires_exactly_once_per_batch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut t = StateTracker::new(&[D::Discovered, D::Disconnected]);
        t.set_listener(Some(Arc::new(move |c: &StateChange<D>| sink.lock().push(*c))));

        t.update(&[
            (D::Disconnected, false),
            (D::ConnectingOverall, true),
            (D::Connecting, true),
        ]);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].was_exited(D::Disconnected));
        assert!(seen[0].was_entered(D::Connecting));
        assert!(!seen[0].was_entered(D::Discovered));
    }

    #[test]
    fn test_noop_update_emits_nothing() {
        let mut t = StateTracker::new(&[D::Discovered]);
        assert!(t.update(&[(D::Discovered, true), (D::Connected, false)]).is_none());
    }

    #[test]
    fn test_entered_exited_match_bit_arithmetic() {
        let mut t = StateTracker::new(&[D::Discovered, D::Connecting]);
        let c = t
            .update(&[(D::Connecting, false), (D::Connected, true)])
            .expect("mask changed");
        for s in D::ALL.iter().copied() {
            let before = c.old & s.bit() != 0;
            let after = c.new & s.bit() != 0;
            assert_eq!(c.was_entered(s), !before && after, "{s:?}");
            assert_eq!(c.was_exited(s), before && !after, "{s:?}");
        }
        assert_eq!(c.entered(), vec![D::Connected]);
        assert_eq!(c.exited(), vec![D::Connecting]);
    }

    #[test]
    fn test_set_clears_unnamed_bits() {
        let mut t = StateTracker::new(&[D::Connected, D::Initialized, D::Bonded]);
        t.set(&D::disconnected_cluster(D::Unbonded, false));
        assert!(t.is(D::Disconnected));
        assert!(!t.is_any(&[D::Connected, D::Initialized]));
        assert!(t.is_all(&[(D::Discovered, true), (D::Advertising, true)]));
    }

    #[test]
    fn test_later_pair_wins() {
        let mut t = StateTracker::<D>::new(&[]);
        t.update(&[(D::Bonding, true), (D::Bonding, false)]);
        assert!(!t.is(D::Bonding));
    }
}
