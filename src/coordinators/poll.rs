use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::device::ReadWriteListener;
use crate::operation::ReadKind;

/// Notification subscription state of a poll entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyState {
    NotEnabled,
    Enabling,
    Enabled,
}

/// A read the device should submit now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollRead {
    pub uuid: Uuid,
    pub kind: ReadKind,
}

struct PollEntry {
    uuid: Uuid,
    /// Read period; for notify entries the forced-read fallback. `None` = never read.
    interval: Option<Duration>,
    track_changes: bool,
    using_notify: bool,
    elapsed: Duration,
    last_value: Option<Vec<u8>>,
    notify: NotifyState,
    listener: Option<ReadWriteListener>,
}

impl PollEntry {
    fn listener_is(&self, other: Option<&ReadWriteListener>) -> bool {
        match (&self.listener, other) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Records `value` and reports whether listeners should see it.
    fn accept(&mut self, value: &[u8]) -> bool {
        if self.track_changes && self.last_value.as_deref() == Some(value) {
            return false;
        }
        self.last_value = Some(value.to_vec());
        true
    }
}

/// Periodic reads, change tracking and notification fallback for one device.
#[derive(Default)]
pub struct PollCoordinator {
    entries: Vec<PollEntry>,
    /// Reads issued and not yet reported, one per characteristic and kind.
    in_flight: Vec<PollRead>,
}

impl PollCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a poll entry, or updates the matching one.
    ///
    /// An entry matches on characteristic, interval, listener and whether it
    /// is notification-driven.
    pub fn start(
        &mut self,
        uuid: Uuid,
        interval: Option<Duration>,
        listener: Option<ReadWriteListener>,
        track_changes: bool,
        using_notify: bool,
    ) {
        if let Some(entry) = self.entries.iter_mut().find(|e| {
            e.uuid == uuid
                && e.interval == interval
                && e.using_notify == using_notify
                && e.listener_is(listener.as_ref())
        }) {
            entry.track_changes = track_changes;
            return;
        }
        let notify = self
            .entries
            .iter()
            .find(|e| e.uuid == uuid && e.using_notify)
            .map_or(NotifyState::NotEnabled, |e| e.notify);
        self.entries.push(PollEntry {
            uuid,
            interval,
            track_changes,
            using_notify,
            elapsed: Duration::ZERO,
            last_value: None,
            notify,
            listener,
        });
    }

    /// Removes entries for `uuid`, optionally narrowed by interval and listener.
    ///
    /// Returns how many were removed.
    pub fn stop(
        &mut self,
        uuid: Uuid,
        interval: Option<Duration>,
        listener: Option<&ReadWriteListener>,
        using_notify: bool,
    ) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| {
            let hit = e.uuid == uuid
                && e.using_notify == using_notify
                && interval.is_none_or(|i| e.interval == Some(i))
                && listener.is_none_or(|l| e.listener_is(Some(l)));
            !hit
        });
        before - self.entries.len()
    }

    /// Advances entry clocks and returns the reads that came due.
    ///
    /// Nothing is issued while the device is not initialized, and at most one
    /// read per characteristic and [`ReadKind`] is in flight. Entries of the
    /// same kind share that read's result.
    pub fn update(&mut self, elapsed: Duration, initialized: bool) -> Vec<PollRead> {
        let mut due = Vec::new();
        for entry in &mut self.entries {
            let Some(interval) = entry.interval else {
                continue;
            };
            entry.elapsed += elapsed;
            if entry.elapsed < interval {
                continue;
            }
            entry.elapsed = Duration::ZERO;
            let read = PollRead {
                uuid: entry.uuid,
                kind: if entry.using_notify {
                    ReadKind::PseudoNotification
                } else {
                    ReadKind::Poll
                },
            };
            if !initialized || self.in_flight.contains(&read) || due.contains(&read) {
                continue;
            }
            due.push(read);
        }
        self.in_flight.extend_from_slice(&due);
        due
    }

    /// A live notification arrived.
    ///
    /// Resets the forced-read timers of notify entries and returns the
    /// listeners that should see the value (`None` = device default).
    pub fn on_notification(&mut self, uuid: Uuid, value: &[u8]) -> Vec<Option<ReadWriteListener>> {
        let mut out = Vec::new();
        for entry in self.entries.iter_mut().filter(|e| e.uuid == uuid && e.using_notify) {
            entry.elapsed = Duration::ZERO;
            if entry.accept(value) {
                push_unique(&mut out, entry.listener.clone());
            }
        }
        out
    }

    /// A poll or pseudo-notification read finished.
    ///
    /// `value` is `None` on failure; failures bypass change tracking.
    pub fn on_read_result(
        &mut self,
        uuid: Uuid,
        kind: ReadKind,
        value: Option<&[u8]>,
    ) -> Vec<Option<ReadWriteListener>> {
        self.in_flight.retain(|r| r.uuid != uuid || r.kind != kind);
        let using_notify = kind == ReadKind::PseudoNotification;
        let mut out = Vec::new();
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| e.uuid == uuid && e.using_notify == using_notify)
        {
            let deliver = match value {
                Some(v) => entry.accept(v),
                None => true,
            };
            if deliver {
                push_unique(&mut out, entry.listener.clone());
            }
        }
        out
    }

    /// Marks every not-yet-enabled notify entry as enabling and returns the
    /// characteristics to subscribe to.
    pub fn enable_notifications(&mut self) -> Vec<Uuid> {
        let mut uuids = Vec::new();
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| e.using_notify && e.notify == NotifyState::NotEnabled)
        {
            entry.notify = NotifyState::Enabling;
            if !uuids.contains(&entry.uuid) {
                uuids.push(entry.uuid);
            }
        }
        uuids
    }

    pub fn on_notify_state(&mut self, uuid: Uuid, state: NotifyState) {
        for entry in self.entries.iter_mut().filter(|e| e.uuid == uuid && e.using_notify) {
            entry.notify = state;
        }
    }

    pub fn notify_state(&self, uuid: Uuid) -> NotifyState {
        self.entries
            .iter()
            .find(|e| e.uuid == uuid && e.using_notify)
            .map_or(NotifyState::NotEnabled, |e| e.notify)
    }

    /// True while any notify entry still wants `uuid`.
    pub fn wants_notify(&self, uuid: Uuid) -> bool {
        self.entries.iter().any(|e| e.uuid == uuid && e.using_notify)
    }

    /// Link lost: subscriptions and in-flight reads are gone.
    pub fn reset(&mut self) {
        self.in_flight.clear();
        for entry in &mut self.entries {
            entry.notify = NotifyState::NotEnabled;
            entry.elapsed = Duration::ZERO;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn push_unique(out: &mut Vec<Option<ReadWriteListener>>, listener: Option<ReadWriteListener>) {
    let seen = out.iter().any(|l| match (l, &listener) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    });
    if !seen {
        out.push(listener);
    }
}
