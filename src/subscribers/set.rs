//! # Per-subscriber fan-out.
//!
//! [`SubscriberSet`] gives each [`Subscribe`] implementation its own bounded
//! queue and worker task, so a slow LogWriter never holds up a metrics
//! exporter and neither holds up the manager.
//!
//! ```text
//!              ┌─► queue(cap A) ─► worker A ─► A.on_event()
//! emit(event) ─┼─► queue(cap B) ─► worker B ─► B.on_event()
//!              └─► queue(cap C) ─► worker C ─► C.on_event() ─ panic ─► SubscriberPanicked
//! ```
//!
//! ## Rules
//! - `emit` uses `try_send` and never waits. A full or closed queue drops the
//!   event for that subscriber only and publishes `SubscriberOverflow`.
//! - Each subscriber sees events in bus order; there is no ordering across
//!   subscribers.
//! - A panic inside `on_event` is caught, published as `SubscriberPanicked`,
//!   and the worker moves on to the next event. State behind a lock the
//!   subscriber held while panicking may be left half-updated.
//! - The set and its workers only hold a [`WeakBus`]. Dropping the set closes
//!   every queue; workers drain what is queued and exit.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::warn;

use crate::events::{Bus, Event, WeakBus};
use crate::manager::panic_message;
use crate::subscribers::Subscribe;

struct Lane {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Bounded, isolated delivery to a fixed list of subscribers.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    workers: Vec<JoinHandle<()>>,
    bus: WeakBus,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber; requires a tokio runtime.
    ///
    /// Queue capacity is [`Subscribe::queue_capacity`], at least 1.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: &Bus) -> Self {
        let bus = bus.downgrade();
        let (lanes, workers) = subs
            .into_iter()
            .map(|sub| {
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let lane = Lane { name: sub.name(), tx };
                (lane, tokio::spawn(worker(sub, rx, bus.clone())))
            })
            .unzip();
        Self {
            lanes,
            workers,
            bus,
        }
    }

    /// Queues `event` for every subscriber.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Like [`emit`](Self::emit) without the extra clone.
    ///
    /// A dropped `SubscriberOverflow` is not reported again.
    pub fn emit_arc(&self, event: Arc<Event>) {
        for lane in &self.lanes {
            let reason = match lane.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if event.is_subscriber_overflow() {
                continue;
            }
            warn!(subscriber = lane.name, reason, kind = event.kind.as_label(), "event dropped");
            self.bus.publish(Event::subscriber_overflow(lane.name, reason));
        }
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Closes the queues and waits until every worker has drained its backlog.
    pub async fn shutdown(self) {
        drop(self.lanes);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn worker(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: WeakBus) {
    while let Some(event) = rx.recv().await {
        let outcome = AssertUnwindSafe(sub.on_event(&event)).catch_unwind().await;
        if let Err(panic) = outcome {
            let info = panic_message(panic.as_ref());
            warn!(subscriber = sub.name(), %info, kind = event.kind.as_label(), "subscriber panicked");
            bus.publish(Event::subscriber_panicked(sub.name(), info));
        }
    }
}
