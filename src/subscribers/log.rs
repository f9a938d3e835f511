//! # LogWriter: bus events as tracing records
//!
//! Renders every [`Event`] as one `tracing` record under the `gattvisor::events`
//! target. Failures and timeouts log at `warn`, diagnostics and subscriber
//! panics at `error`, the rest at `debug`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! DEBUG gattvisor::events: operation_queued device="AA:01" operation=3 label="connect"
//! WARN  gattvisor::events: operation_timed_out device="AA:01" operation=3 timeout_ms=12500
//! WARN  gattvisor::events: connection_failed device="AA:01" reason="native_connection_timed_out" attempt=1
//! ERROR gattvisor::events: diagnostic device="AA:01" reason="initialized but not connected"
//! ```

use async_trait::async_trait;
use tracing::{Level, debug, error, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn level(kind: EventKind) -> Level {
        match kind {
            EventKind::Diagnostic | EventKind::SubscriberPanicked => Level::ERROR,
            EventKind::OperationFailed
            | EventKind::OperationTimedOut
            | EventKind::ConnectionFailed
            | EventKind::ReconnectStopped
            | EventKind::SubscriberOverflow => Level::WARN,
            _ => Level::DEBUG,
        }
    }
}

macro_rules! record {
    ($mac:ident, $e:expr) => {
        $mac!(
            target: "gattvisor::events",
            seq = $e.seq,
            device = ?$e.device.as_deref(),
            operation = ?$e.operation,
            label = ?$e.label,
            reason = ?$e.reason.as_deref(),
            attempt = ?$e.attempt,
            uuid = ?$e.uuid,
            timeout_ms = ?$e.timeout_ms,
            delay_ms = ?$e.delay_ms,
            old_mask = ?$e.old_mask,
            new_mask = ?$e.new_mask,
            "{}",
            $e.kind.as_label()
        )
    };
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match Self::level(e.kind) {
            Level::ERROR => record!(error, e),
            Level::WARN => record!(warn, e),
            _ => record!(debug, e),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
