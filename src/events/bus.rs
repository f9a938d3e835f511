//! # Broadcast channel for scheduler, device and radio events.
//!
//! ```text
//!   Scheduler ─┐                      ┌─► subscriber_listener ─► SubscriberSet
//!   Device  …  ├─ publish ─► Bus ─────┤       (spawned by Manager)
//!   Manager  ──┘    (ring buffer)     └─► Manager::subscribe() receivers
//! ```
//!
//! ## Rules
//! - `publish` is a synchronous `broadcast::Sender::send`; it is safe from
//!   native callback threads and needs no tokio runtime.
//! - One ring buffer of `capacity` slots is shared by every receiver. A
//!   receiver that falls behind gets `RecvError::Lagged(n)` and resumes at the
//!   oldest retained event.
//! - Events published while nobody listens are dropped.
//! - The channel closes when the last [`Bus`] clone is dropped. A [`WeakBus`]
//!   publishes while a `Bus` is alive and does not keep the channel open.

use std::sync::{Arc, Weak};

use tokio::sync::broadcast;

use super::event::Event;

/// Fire-and-forget event channel. Clones share one sender.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: Arc<broadcast::Sender<Event>>,
}

/// Non-owning publisher handle, see [`Bus::downgrade`].
#[derive(Clone, Debug)]
pub struct WeakBus {
    tx: Weak<broadcast::Sender<Event>>,
}

impl Bus {
    /// Capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx: Arc::new(tx) }
    }

    pub fn publish(&self, event: Event) {
        // Err only means there are no receivers right now.
        let _ = self.tx.send(event);
    }

    /// A receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn downgrade(&self) -> WeakBus {
        WeakBus {
            tx: Arc::downgrade(&self.tx),
        }
    }
}

impl WeakBus {
    /// Publishes if the bus is still alive; otherwise drops `event`.
    pub fn publish(&self, event: Event) {
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(event);
        }
    }
}
