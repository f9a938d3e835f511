//! # The subscriber extension point.
//!
//! Implement [`Subscribe`] to observe bus events (metrics, audit trails,
//! test recorders). The manager hands each implementation its own bounded queue
//! and worker task through a [`SubscriberSet`](crate::subscribers::SubscriberSet),
//! so `on_event` may await I/O without delaying radio work.
//!
//! When the queue declared by [`Subscribe::queue_capacity`] is full, further
//! events for that subscriber are dropped and a `SubscriberOverflow` event is
//! published.
//!
//! ## Example
//! ```rust
//! use gattvisor::{Event, EventKind, Subscribe};
//!
//! struct FailureCounter(std::sync::atomic::AtomicU32);
//!
//! #[async_trait::async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::ConnectionFailed {
//!             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!         }
//!     }
//!     fn name(&self) -> &'static str { "failure-counter" }
//!     fn queue_capacity(&self) -> usize { 256 }
//! }
//! ```

use crate::events::Event;
use async_trait::async_trait;

/// Receives bus events on a dedicated worker task.
///
/// Do not block the runtime inside `on_event`; await instead.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &Event);

    /// Name used in overflow and panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue slots reserved for this subscriber.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
