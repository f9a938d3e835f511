use std::panic::{AssertUnwindSafe, catch_unwind};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::core::{Callback, panic_message};

/// Receiving end of redispatched listener calls.
///
/// Exists only when [`Config::post_callbacks`](crate::Config::post_callbacks)
/// is set. Drain it on the context that must observe listener calls, either
/// synchronously with [`run_pending`](Self::run_pending) or as a task with
/// [`run`](Self::run). Calls arrive in the order the manager produced them.
pub struct CallbackPump {
    rx: mpsc::UnboundedReceiver<Callback>,
}

impl CallbackPump {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Callback>) -> Self {
        Self { rx }
    }

    /// Runs every call queued so far and returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut n = 0;
        while let Ok(callback) = self.rx.try_recv() {
            invoke(callback);
            n += 1;
        }
        n
    }

    /// Runs calls as they arrive until cancelled or the manager is dropped.
    pub async fn run(mut self, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                next = self.rx.recv() => match next {
                    Some(callback) => invoke(callback),
                    None => return,
                },
            }
        }
    }
}

fn invoke(callback: Callback) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(callback)) {
        error!(info = %panic_message(panic.as_ref()), "posted listener panicked");
    }
}

impl std::fmt::Debug for CallbackPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackPump").finish_non_exhaustive()
    }
}
