mod common;

use std::sync::Arc;
use std::time::Duration;

use gattvisor::{
    Config, Device, DeviceId, DeviceState, EventKind, Manager, ManagerError, NativeEvent,
    OperationKind, OperationState, Please, ReadWriteResult, ReadWriteStatus,
};
use parking_lot::Mutex;

use common::{BATTERY, MockRadio, drain, of_kind};

const ID: &str = "AA:BB:CC:00:00:01";

fn initialize(manager: &Manager, radio: &MockRadio) -> Arc<Device> {
    let device = manager.discover(ID);
    device.connect();
    radio.set_connected(device.id(), true);
    manager.on_native_event(device.id(), NativeEvent::Connected);
    manager.on_native_event(device.id(), NativeEvent::ServicesDiscovered { status: 0 });
    assert!(device.is(DeviceState::Initialized), "{device:?}");
    device
}

#[test]
fn test_connect_timeout_records_one_failure() {
    let (manager, radio) = common::manager(Config::default());
    let mut rx = manager.subscribe();
    let device = manager.discover(ID);

    device.connect();
    assert!(device.is_all(&[
        (DeviceState::ConnectingOverall, true),
        (DeviceState::Connecting, true),
        (DeviceState::Disconnected, false),
    ]));

    for _ in 0..12 {
        manager.tick(Duration::from_secs(1));
    }
    assert_eq!(device.connection_fail_count(), 0);

    manager.tick(Duration::from_secs(1));
    assert_eq!(device.connection_fail_count(), 1);
    assert_eq!(radio.count("close"), 1);

    let events = drain(&mut rx);
    assert_eq!(of_kind(&events, EventKind::OperationTimedOut).len(), 1);
    let failed = of_kind(&events, EventKind::ConnectionFailed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].reason.as_deref(), Some("native_connection_timed_out"));
    assert_eq!(failed[0].label, Some("retry"));
    assert_eq!(failed[0].attempt, Some(1));

    // Retried within bound.
    assert_eq!(radio.count("connect"), 2);
    assert!(device.is(DeviceState::Connecting));
}

#[test]
fn test_rogue_disconnect_starts_reconnect_loop() {
    let (manager, radio) = common::manager(Config::default());
    let device = initialize(&manager, &radio);
    let mut rx = manager.subscribe();

    radio.set_connected(device.id(), false);
    manager.on_native_event(device.id(), NativeEvent::Disconnected { status: 8 });

    assert!(device.is_reconnecting());
    assert!(device.is_all(&[
        (DeviceState::Disconnected, true),
        (DeviceState::AttemptingReconnect, true),
        (DeviceState::Advertising, false),
        (DeviceState::Initialized, false),
        (DeviceState::Connected, false),
    ]));
    assert!(manager.scheduler_snapshot().is_empty());
    let events = drain(&mut rx);
    assert_eq!(of_kind(&events, EventKind::ReconnectStarted).len(), 1);

    // The drop is reported to the connection-fail policy without counting.
    let failed = of_kind(&events, EventKind::ConnectionFailed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].reason.as_deref(), Some("rogue_disconnect"));
    assert_eq!(failed[0].attempt, Some(0));
    assert_eq!(device.connection_fail_count(), 0);

    // First interval of the default backoff is one second.
    manager.tick(Duration::from_millis(500));
    assert!(manager.scheduler_snapshot().is_empty());
    manager.tick(Duration::from_millis(500));

    let snapshot = manager.scheduler_snapshot();
    let current = snapshot.current.expect("reconnect attempt executing");
    assert!(matches!(current.kind, OperationKind::Connect { .. }));
    assert!(!current.explicit);
    assert_eq!(of_kind(&drain(&mut rx), EventKind::ReconnectAttempt).len(), 1);

    // The attempt succeeds and the loop stops.
    radio.set_connected(device.id(), true);
    manager.on_native_event(device.id(), NativeEvent::Connected);
    manager.on_native_event(device.id(), NativeEvent::ServicesDiscovered { status: 0 });
    assert!(device.is(DeviceState::Initialized));
    assert!(!device.is_reconnecting());
    assert!(!device.is(DeviceState::AttemptingReconnect));
}

#[test]
fn test_failed_reconnect_attempt_defers_to_reconnect_policy() {
    let cfg = Config {
        connection_fail_retry_count: 0,
        ..Config::default()
    };
    let (manager, radio) = common::manager(cfg);
    let device = initialize(&manager, &radio);
    let mut rx = manager.subscribe();

    radio.set_connected(device.id(), false);
    manager.on_native_event(device.id(), NativeEvent::Disconnected { status: 8 });
    manager.tick(Duration::from_secs(1));
    manager.on_native_event(device.id(), NativeEvent::ConnectFailed { status: 133 });

    // Verdicts are observational while the loop runs.
    let events = drain(&mut rx);
    let reasons: Vec<Option<&str>> = of_kind(&events, EventKind::ConnectionFailed)
        .into_iter()
        .map(|e| e.reason.as_deref())
        .collect();
    assert_eq!(
        reasons,
        vec![Some("rogue_disconnect"), Some("native_connection_failed")]
    );
    assert!(device.is_reconnecting());
    assert_eq!(device.connection_fail_count(), 0);
    assert!(device.is(DeviceState::AttemptingReconnect));

    // Second interval is two seconds.
    manager.tick(Duration::from_secs(1));
    assert!(manager.scheduler_snapshot().is_empty());
    manager.tick(Duration::from_secs(1));
    assert_eq!(manager.scheduler_snapshot().len(), 1);
}

#[test]
fn test_reconnect_exhaustion_lands_disconnected() {
    let cfg = Config {
        reconnect_max_attempts: 1,
        ..Config::default()
    };
    let (manager, radio) = common::manager(cfg);
    let device = initialize(&manager, &radio);
    let mut rx = manager.subscribe();

    radio.set_connected(device.id(), false);
    manager.on_native_event(device.id(), NativeEvent::Disconnected { status: 8 });
    manager.tick(Duration::from_secs(1));
    manager.on_native_event(device.id(), NativeEvent::ConnectFailed { status: 133 });

    assert!(!device.is_reconnecting());
    assert!(device.is_all(&[
        (DeviceState::Disconnected, true),
        (DeviceState::AttemptingReconnect, false),
        (DeviceState::Advertising, true),
    ]));
    let stopped = of_kind(&drain(&mut rx), EventKind::ReconnectStopped)
        .into_iter()
        .map(|e| e.reason.as_deref().map(str::to_owned))
        .collect::<Vec<_>>();
    assert_eq!(stopped, vec![Some("exhausted".to_owned())]);
}

#[test]
fn test_explicit_disconnect_cancels_pending_read() {
    let (manager, radio) = common::manager(Config::default());
    let device = initialize(&manager, &radio);

    let results: Arc<Mutex<Vec<ReadWriteResult>>> = Arc::default();
    let sink = results.clone();
    let listener = Arc::new(move |r: &ReadWriteResult| sink.lock().push(r.clone()));

    let first = device.read(BATTERY, Some(listener.clone())).expect("scheduled");
    let second = device.read(BATTERY, Some(listener)).expect("scheduled");
    let snapshot = manager.scheduler_snapshot();
    assert_eq!(snapshot.current.as_ref().map(|v| v.id), Some(first));
    assert_eq!(snapshot.pending[0].id, second);
    assert_eq!(snapshot.pending[0].state, OperationState::Queued);

    device.disconnect();

    let got = results.lock().clone();
    assert_eq!(got.len(), 2);
    assert!(got.iter().all(|r| r.status == ReadWriteStatus::Cancelled));
    assert!(device.is_all(&[
        (DeviceState::Disconnected, true),
        (DeviceState::Connected, false),
        (DeviceState::Connecting, false),
        (DeviceState::ConnectingOverall, false),
        (DeviceState::Initialized, false),
    ]));
    assert!(!device.is_reconnecting());

    // The native disconnect completes; no reconnect follows.
    radio.set_connected(device.id(), false);
    manager.on_native_event(device.id(), NativeEvent::Disconnected { status: 0 });
    manager.tick(Duration::from_secs(5));
    assert!(!device.is_reconnecting());
    assert!(manager.scheduler_snapshot().is_empty());
}

#[test]
fn test_retry_bound_two_yields_retry_retry_give_up() {
    let verdicts: Arc<Mutex<Vec<Please>>> = Arc::default();
    let seen = verdicts.clone();
    let radio = Arc::new(MockRadio::default());
    let manager = gattvisor::ManagerBuilder::new(Config::default(), radio.clone())
        .with_connection_fail_policy(Arc::new(move |ev: &gattvisor::ConnectionFailEvent| {
            let please = if ev.failure_count <= 2 {
                Please::Retry
            } else {
                Please::DoNotRetry
            };
            seen.lock().push(please);
            please
        }))
        .build()
        .expect("build");

    let device = manager.discover(ID);
    device.connect();
    for _ in 0..3 {
        manager.on_native_event(device.id(), NativeEvent::ConnectFailed { status: 133 });
    }

    assert_eq!(
        *verdicts.lock(),
        vec![Please::Retry, Please::Retry, Please::DoNotRetry]
    );
    assert_eq!(radio.count("connect"), 3);
    assert!(device.is(DeviceState::Disconnected));
    assert!(!device.is(DeviceState::ConnectingOverall));
    assert!(manager.scheduler_snapshot().is_empty());
}

#[test]
fn test_explicit_connect_resets_failure_count() {
    let cfg = Config {
        connection_fail_retry_count: 0,
        ..Config::default()
    };
    let (manager, _radio) = common::manager(cfg);
    let device = manager.discover(ID);

    device.connect();
    manager.on_native_event(device.id(), NativeEvent::ConnectFailed { status: 133 });
    assert_eq!(device.connection_fail_count(), 1);
    assert!(device.is(DeviceState::Disconnected));

    device.connect();
    assert_eq!(device.connection_fail_count(), 0);
}

#[test]
fn test_undiscover_cancels_and_forgets() {
    let (manager, radio) = common::manager(Config::default());
    let device = initialize(&manager, &radio);
    device.read(BATTERY, None);

    assert_eq!(manager.undiscover(&DeviceId::from(ID)), Ok(()));
    assert!(device.is(DeviceState::Undiscovered));
    assert!(manager.device(device.id()).is_none());
    assert!(manager.scheduler_snapshot().is_empty());
    assert_eq!(
        manager.undiscover(&DeviceId::from(ID)),
        Err(ManagerError::UnknownDevice {
            id: DeviceId::from(ID)
        })
    );
}

#[test]
fn test_service_discovery_failure_drops_the_link() {
    let cfg = Config {
        connection_fail_retry_count: 0,
        ..Config::default()
    };
    let (manager, radio) = common::manager(cfg);
    let device = manager.discover(ID);
    device.connect();
    radio.set_connected(device.id(), true);
    manager.on_native_event(device.id(), NativeEvent::Connected);
    manager.on_native_event(device.id(), NativeEvent::ServicesDiscovered { status: 133 });

    assert_eq!(radio.count("disconnect"), 1);
    assert!(device.is(DeviceState::Disconnected));
    assert!(!device.is(DeviceState::GettingServices));
}

#[test]
fn test_native_connect_failure_leaves_no_disconnect_behind() {
    let cfg = Config {
        connection_fail_retry_count: 0,
        ..Config::default()
    };
    let (manager, radio) = common::manager(cfg);
    let device = manager.discover(ID);
    device.connect();
    // A stale link flag does not turn a refused connect into a disconnect.
    radio.set_connected(device.id(), true);
    manager.on_native_event(device.id(), NativeEvent::ConnectFailed { status: 133 });

    assert_eq!(radio.count("disconnect"), 0);
    assert!(manager.scheduler_snapshot().is_empty());
}
