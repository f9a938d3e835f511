mod common;

use std::collections::HashSet;
use std::time::Duration;

use gattvisor::{
    Bus, CancelCause, DeviceId, GATT_SUCCESS, NativeEvent, Operation, OperationId, OperationKind,
    OperationState, Priority, ReadKind, Scheduler, Target,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use common::{BATTERY, MockRadio};

const PRIORITIES: [Priority; 6] = [
    Priority::Low,
    Priority::Medium,
    Priority::ForNormalReadsWrites,
    Priority::ForPriorityReadsWrites,
    Priority::ForExplicitBondingAndConnecting,
    Priority::Critical,
];

fn read(device: &str, priority: Priority) -> Operation {
    Operation::new(
        Target::Device(DeviceId::from(device)),
        OperationKind::Read {
            uuid: BATTERY,
            kind: ReadKind::Read,
        },
    )
    .with_priority(priority)
    .with_timeout(Some(Duration::from_secs(3)))
}

fn assert_well_formed(s: &Scheduler) {
    let snapshot = s.snapshot();
    if let Some(current) = &snapshot.current {
        assert_eq!(current.state, OperationState::Executing);
    }
    for view in &snapshot.pending {
        assert_eq!(view.state, OperationState::Queued, "{view:?}");
    }
    for pair in snapshot.pending.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            a.priority > b.priority || (a.priority == b.priority && a.ordinal < b.ordinal),
            "out of order: {a:?} before {b:?}"
        );
    }
}

#[test]
fn test_random_traffic_keeps_queue_well_formed() {
    let mut rng = StdRng::seed_from_u64(0x6a77);
    let radio = MockRadio::default();
    let mut s = Scheduler::new(Bus::new(4096));
    let mut submitted: HashSet<OperationId> = HashSet::new();
    let mut reported: HashSet<OperationId> = HashSet::new();
    let devices = ["a", "b", "c"];

    for _ in 0..2_000 {
        match rng.random_range(0..10) {
            0..=3 => {
                let device = devices[rng.random_range(0..devices.len())];
                let priority = PRIORITIES[rng.random_range(0..PRIORITIES.len())];
                submitted.insert(s.submit(read(device, priority)));
            }
            4 | 5 => s.tick(Duration::from_millis(rng.random_range(0..1_500)), &radio),
            6 | 7 => {
                let Some(dev) = s.current().and_then(|op| op.device()).cloned() else {
                    continue;
                };
                let status = if rng.random_bool(0.8) { GATT_SUCCESS } else { 133 };
                let done = NativeEvent::ReadComplete {
                    uuid: BATTERY,
                    status,
                    value: vec![1],
                };
                s.deliver(&dev, &done, &radio);
            }
            8 => {
                let dev = DeviceId::from(devices[rng.random_range(0..devices.len())]);
                s.cancel(|op| op.is_for_device(&dev), CancelCause::Explicit);
                s.pump(&radio);
            }
            _ => {
                radio.set_accept(rng.random_bool(0.7));
                s.pump(&radio);
            }
        }

        assert_well_formed(&s);
        for report in s.drain_reports() {
            assert!(report.state.is_terminal());
            assert!(submitted.contains(&report.id));
            assert!(reported.insert(report.id), "{} reported twice", report.id);
        }
    }

    // Every submitted operation is either still scheduled or reported exactly once.
    let live: HashSet<OperationId> = s.snapshot().iter().map(|v| v.id).collect();
    assert!(live.is_disjoint(&reported));
    assert_eq!(live.len() + reported.len(), submitted.len());
}

#[test]
fn test_late_callback_after_cancel_is_ignored() {
    let radio = MockRadio::default();
    let mut s = Scheduler::new(Bus::new(64));
    let id = s.submit(read("a", Priority::ForNormalReadsWrites));
    s.pump(&radio);
    assert_eq!(s.current().map(|op| op.id()), Some(id));

    assert_eq!(s.cancel(|_| true, CancelCause::Disconnect), 1);
    let late = NativeEvent::ReadComplete {
        uuid: BATTERY,
        status: GATT_SUCCESS,
        value: vec![9],
    };
    assert_eq!(
        s.deliver(&DeviceId::from("a"), &late, &radio),
        gattvisor::Delivery::Unmatched
    );

    let reports = s.drain_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].state, OperationState::SoftlyCancelled);
    assert_eq!(reports[0].cancelled_from, Some(OperationState::Executing));
    assert!(reports[0].payload.is_none());
}

#[test]
fn test_executing_work_is_not_preempted() {
    let radio = MockRadio::default();
    let mut s = Scheduler::new(Bus::new(64));
    let low = s.submit(read("a", Priority::Low));
    s.pump(&radio);

    let critical = s.submit(read("b", Priority::Critical));
    s.pump(&radio);
    assert_eq!(s.current().map(|op| op.id()), Some(low));

    s.tick(Duration::from_secs(3), &radio);
    assert_eq!(s.current().map(|op| op.id()), Some(critical));
}

#[test]
fn test_explicit_connect_supersedes_queued_disconnect_only() {
    let radio = MockRadio::default();
    let mut s = Scheduler::new(Bus::new(64));
    let dev = Target::Device(DeviceId::from("a"));
    s.submit(read("b", Priority::Critical));
    s.pump(&radio);
    s.submit(Operation::new(dev.clone(), OperationKind::Disconnect));

    s.submit(Operation::new(
        dev.clone(),
        OperationKind::Connect {
            auto_connect: false,
        },
    ));
    assert!(s.drain_reports().is_empty());

    s.submit(
        Operation::new(
            dev,
            OperationKind::Connect {
                auto_connect: false,
            },
        )
        .with_explicit(true),
    );
    let reports = s.drain_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, OperationKind::Disconnect);
    assert_eq!(reports[0].state, OperationState::SoftlyCancelled);
}
