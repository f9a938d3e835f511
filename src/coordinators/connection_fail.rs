use std::sync::Arc;

use crate::device::DeviceId;
use crate::policies::{ConnectionFailEvent, ConnectionFailPolicy, ConnectionFailReason, Please};

use super::ConnectMode;

/// Outcome of one failed connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// What the policy was shown.
    pub event: ConnectionFailEvent,
    /// What the policy answered.
    pub please: Please,
    /// False while reconnecting or for explicit cancellation: the answer is
    /// reported but must not drive a retry.
    pub authoritative: bool,
}

impl Verdict {
    /// True only when the policy asked for a retry and its answer counts.
    pub fn should_retry(&self) -> bool {
        self.authoritative && self.please.is_retry()
    }
}

/// Counts consecutive connection failures and consults the retry policy.
pub struct ConnectionFailCoordinator {
    device: DeviceId,
    failures: u32,
    policy: Arc<dyn ConnectionFailPolicy>,
}

impl ConnectionFailCoordinator {
    pub fn new(device: DeviceId, policy: Arc<dyn ConnectionFailPolicy>) -> Self {
        Self {
            device,
            failures: 0,
            policy,
        }
    }

    pub fn set_policy(&mut self, policy: Arc<dyn ConnectionFailPolicy>) {
        self.policy = policy;
    }

    pub fn failure_count(&self) -> u32 {
        self.failures
    }

    /// Records a failure and asks the policy.
    ///
    /// The counter advances only in [`ConnectMode::Direct`] and never for
    /// [`ConnectionFailReason::ExplicitlyCancelled`]. The policy is consulted in
    /// every case so observers see each failure.
    pub fn on_connection_failed(
        &mut self,
        reason: ConnectionFailReason,
        status: Option<i32>,
        mode: ConnectMode,
    ) -> Verdict {
        let authoritative =
            mode == ConnectMode::Direct && reason != ConnectionFailReason::ExplicitlyCancelled;
        if authoritative {
            self.failures = self.failures.saturating_add(1);
        }

        let event = ConnectionFailEvent {
            device: self.device.clone(),
            reason,
            failure_count: self.failures,
            status,
            mode,
        };
        let please = self.policy.on_event(&event);
        Verdict {
            event,
            please,
            authoritative,
        }
    }

    pub fn on_fully_initialized(&mut self) {
        self.failures = 0;
    }

    pub fn on_explicit_connection_started(&mut self) {
        self.failures = 0;
    }

    pub fn on_explicit_disconnect(&mut self) {
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::DefaultConnectionFailPolicy;

    fn coordinator(bound: u32) -> ConnectionFailCoordinator {
        ConnectionFailCoordinator::new(
            DeviceId::from("d"),
            Arc::new(DefaultConnectionFailPolicy::new(bound)),
        )
    }

    #[test]
    fn test_retry_bound_two() {
        let mut c = coordinator(2);
        let got: Vec<Please> = (0..3)
            .map(|_| {
                c.on_connection_failed(
                    ConnectionFailReason::NativeConnectionFailed,
                    Some(133),
                    ConnectMode::Direct,
                )
                .please
            })
            .collect();
        assert_eq!(got, vec![Please::Retry, Please::Retry, Please::DoNotRetry]);
        assert_eq!(c.failure_count(), 3);
    }

    #[test]
    fn test_reconnecting_does_not_count() {
        let mut c = coordinator(0);
        let v = c.on_connection_failed(
            ConnectionFailReason::NativeConnectionTimedOut,
            None,
            ConnectMode::Reconnecting,
        );
        assert!(!v.authoritative);
        assert!(!v.should_retry());
        assert_eq!(c.failure_count(), 0);
        assert_eq!(v.event.mode, ConnectMode::Reconnecting);
    }

    #[test]
    fn test_explicit_cancel_is_not_penalized() {
        let mut c = coordinator(5);
        let v = c.on_connection_failed(
            ConnectionFailReason::ExplicitlyCancelled,
            None,
            ConnectMode::Direct,
        );
        assert!(!v.should_retry());
        assert_eq!(c.failure_count(), 0);
    }

    #[test]
    fn test_resets() {
        let mut c = coordinator(5);
        for _ in 0..3 {
            c.on_connection_failed(
                ConnectionFailReason::RogueDisconnect,
                Some(8),
                ConnectMode::Direct,
            );
        }
        c.on_fully_initialized();
        assert_eq!(c.failure_count(), 0);

        c.on_connection_failed(ConnectionFailReason::RogueDisconnect, None, ConnectMode::Direct);
        c.on_explicit_connection_started();
        assert_eq!(c.failure_count(), 0);

        c.on_connection_failed(ConnectionFailReason::RogueDisconnect, None, ConnectMode::Direct);
        c.on_explicit_disconnect();
        assert_eq!(c.failure_count(), 0);
    }

    #[test]
    fn test_policy_sees_running_count() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut c = ConnectionFailCoordinator::new(
            DeviceId::from("d"),
            Arc::new(move |ev: &ConnectionFailEvent| {
                sink.lock().push(ev.failure_count);
                Please::Retry
            }),
        );
        for _ in 0..3 {
            c.on_connection_failed(
                ConnectionFailReason::GettingServicesFailed,
                None,
                ConnectMode::Direct,
            );
        }
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }
}
