use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::ManagerError;
use crate::events::Bus;
use crate::native::NativeRadio;
use crate::policies::{
    BackoffReconnectPolicy, ConnectionFailPolicy, DefaultConnectionFailPolicy, ReconnectPolicy,
};
use crate::subscribers::Subscribe;

use super::core::{Core, Dispatch};
use super::manager::Manager;
use super::pump::CallbackPump;

/// Builder for constructing a [`Manager`] with optional features.
pub struct ManagerBuilder {
    cfg: Config,
    radio: Arc<dyn NativeRadio>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    fail_policy: Option<Arc<dyn ConnectionFailPolicy>>,
    reconnect_policy: Option<Arc<dyn ReconnectPolicy>>,
}

impl ManagerBuilder {
    /// Creates a new builder over the given radio.
    pub fn new(cfg: Config, radio: Arc<dyn NativeRadio>) -> Self {
        Self {
            cfg,
            radio,
            subscribers: Vec::new(),
            fail_policy: None,
            reconnect_policy: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive bus events through dedicated workers with bounded
    /// queues, which requires a tokio runtime at [`build`](Self::build) time.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the default retry-count policy for every device.
    pub fn with_connection_fail_policy(mut self, policy: Arc<dyn ConnectionFailPolicy>) -> Self {
        self.fail_policy = Some(policy);
        self
    }

    /// Replaces the default backoff reconnect policy for every device.
    pub fn with_reconnect_policy(mut self, policy: Arc<dyn ReconnectPolicy>) -> Self {
        self.reconnect_policy = Some(policy);
        self
    }

    /// Builds the manager.
    ///
    /// # Errors
    /// [`ManagerError::NoRuntime`] when subscribers are set but no tokio
    /// runtime is running.
    pub fn build(self) -> Result<Arc<Manager>, ManagerError> {
        if !self.subscribers.is_empty() && tokio::runtime::Handle::try_current().is_err() {
            return Err(ManagerError::NoRuntime);
        }

        let bus = Bus::new(self.cfg.bus_capacity);
        let fail_policy = self.fail_policy.unwrap_or_else(|| {
            Arc::new(DefaultConnectionFailPolicy::new(
                self.cfg.connection_fail_retry_count,
            ))
        });
        let reconnect_policy = self
            .reconnect_policy
            .unwrap_or_else(|| Arc::new(BackoffReconnectPolicy::from_config(&self.cfg)));

        let (dispatch, pump) = if self.cfg.post_callbacks {
            let (tx, rx) = mpsc::unbounded_channel();
            (Dispatch::Posted(tx), Some(CallbackPump::new(rx)))
        } else {
            (Dispatch::Inline, None)
        };

        let core = Arc::new(Core::new(
            self.cfg,
            self.radio,
            bus,
            fail_policy,
            reconnect_policy,
            dispatch,
        ));
        Ok(Arc::new(Manager::new_internal(core, self.subscribers, pump)))
    }
}
