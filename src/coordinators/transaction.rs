use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use uuid::Uuid;

use crate::device::{DeviceId, ReadWriteResult};

static TXN_SEQ: AtomicU64 = AtomicU64::new(1);

/// Process-unique transaction identity; also the scheduler lock token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(u64);

impl TxnId {
    pub fn next() -> Self {
        Self(TXN_SEQ.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Which flow a transaction implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnKind {
    Authentication,
    Initialization,
    FirmwareUpdate,
}

impl TxnKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            TxnKind::Authentication => "authentication",
            TxnKind::Initialization => "initialization",
            TxnKind::FirmwareUpdate => "firmware_update",
        }
    }
}

/// Traffic a transaction asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnRequest {
    Read(Uuid),
    Write(Uuid, Vec<u8>),
}

/// Handle a [`Transaction`] uses to issue traffic and end itself.
#[derive(Debug)]
pub struct TxnContext {
    device: DeviceId,
    kind: TxnKind,
    requests: Vec<TxnRequest>,
    outcome: Option<bool>,
}

impl TxnContext {
    fn new(device: DeviceId, kind: TxnKind) -> Self {
        Self {
            device,
            kind,
            requests: Vec::new(),
            outcome: None,
        }
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn kind(&self) -> TxnKind {
        self.kind
    }

    /// Queues a read that bypasses the device's transaction lock.
    pub fn read(&mut self, uuid: Uuid) {
        self.requests.push(TxnRequest::Read(uuid));
    }

    /// Queues a write that bypasses the device's transaction lock.
    pub fn write(&mut self, uuid: Uuid, data: impl Into<Vec<u8>>) {
        self.requests.push(TxnRequest::Write(uuid, data.into()));
    }

    pub fn succeed(&mut self) {
        self.outcome.get_or_insert(true);
    }

    pub fn fail(&mut self) {
        self.outcome.get_or_insert(false);
    }

    pub fn is_ended(&self) -> bool {
        self.outcome.is_some()
    }
}

/// An application-defined multi-step GATT exchange.
///
/// Hooks run while the device lock is held; they must not call back into the
/// device. Results of the transaction's own reads and writes arrive through
/// [`on_result`](Transaction::on_result).
pub trait Transaction: Send + 'static {
    fn start(&mut self, cx: &mut TxnContext);

    fn on_result(&mut self, result: &ReadWriteResult, cx: &mut TxnContext) {
        let _ = (result, cx);
    }

    fn update(&mut self, elapsed: Duration, cx: &mut TxnContext) {
        let _ = (elapsed, cx);
    }
}

/// Creates a fresh transaction for each connection.
pub type TxnFactory = Arc<dyn Fn() -> Box<dyn Transaction> + Send + Sync>;

/// What the device must do after driving a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnSignal {
    Request(TxnId, TxnRequest),
    Ended {
        id: TxnId,
        kind: TxnKind,
        succeeded: bool,
    },
}

struct ActiveTxn {
    id: TxnId,
    kind: TxnKind,
    txn: Box<dyn Transaction>,
}

/// Runs at most one transaction per device.
pub struct TransactionCoordinator {
    device: DeviceId,
    active: Option<ActiveTxn>,
}

impl TransactionCoordinator {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            active: None,
        }
    }

    /// Starts `txn`. Returns `None` if another transaction is running.
    pub fn start(
        &mut self,
        kind: TxnKind,
        txn: Box<dyn Transaction>,
    ) -> Option<(TxnId, Vec<TxnSignal>)> {
        if self.active.is_some() {
            return None;
        }
        let id = TxnId::next();
        self.active = Some(ActiveTxn { id, kind, txn });
        let signals = self.drive(|txn, cx| txn.start(cx));
        Some((id, signals))
    }

    /// Feeds the result of one of the transaction's own operations.
    pub fn on_result(&mut self, id: TxnId, result: &ReadWriteResult) -> Vec<TxnSignal> {
        if self.active_id() != Some(id) {
            return Vec::new();
        }
        self.drive(|txn, cx| txn.on_result(result, cx))
    }

    pub fn update(&mut self, elapsed: Duration) -> Vec<TxnSignal> {
        self.drive(|txn, cx| txn.update(elapsed, cx))
    }

    /// Drops the running transaction without an outcome.
    pub fn cancel(&mut self) -> Option<(TxnId, TxnKind)> {
        self.active.take().map(|a| (a.id, a.kind))
    }

    pub fn active_id(&self) -> Option<TxnId> {
        self.active.as_ref().map(|a| a.id)
    }

    pub fn active_kind(&self) -> Option<TxnKind> {
        self.active.as_ref().map(|a| a.kind)
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    fn drive<F>(&mut self, f: F) -> Vec<TxnSignal>
    where
        F: FnOnce(&mut dyn Transaction, &mut TxnContext),
    {
        let Some(active) = self.active.as_mut() else {
            return Vec::new();
        };
        let mut cx = TxnContext::new(self.device.clone(), active.kind);
        f(active.txn.as_mut(), &mut cx);

        let (id, kind) = (active.id, active.kind);
        match cx.outcome {
            Some(succeeded) => {
                self.active = None;
                vec![TxnSignal::Ended {
                    id,
                    kind,
                    succeeded,
                }]
            }
            None => cx
                .requests
                .into_iter()
                .map(|r| TxnSignal::Request(id, r))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ReadWriteKind, ReadWriteStatus};

    const KEY: Uuid = Uuid::from_u128(0xfff1);

    /// Writes a key, then succeeds on a successful write result.
    struct Handshake;

    impl Transaction for Handshake {
        fn start(&mut self, cx: &mut TxnContext) {
            cx.write(KEY, vec![0xAA]);
        }

        fn on_result(&mut self, result: &ReadWriteResult, cx: &mut TxnContext) {
            if result.was_success() {
                cx.succeed();
            } else {
                cx.fail();
            }
        }
    }

    fn result(status: ReadWriteStatus) -> ReadWriteResult {
        ReadWriteResult::blank(DeviceId::from("d"), KEY, ReadWriteKind::Write, status)
    }

    #[test]
    fn test_start_emits_requests() {
        let mut c = TransactionCoordinator::new(DeviceId::from("d"));
        let (id, signals) = c
            .start(TxnKind::Authentication, Box::new(Handshake))
            .expect("started");
        assert_eq!(
            signals,
            vec![TxnSignal::Request(id, TxnRequest::Write(KEY, vec![0xAA]))]
        );
        assert_eq!(c.active_kind(), Some(TxnKind::Authentication));
    }

    #[test]
    fn test_only_one_at_a_time() {
        let mut c = TransactionCoordinator::new(DeviceId::from("d"));
        assert!(c.start(TxnKind::Authentication, Box::new(Handshake)).is_some());
        assert!(c.start(TxnKind::Initialization, Box::new(Handshake)).is_none());
    }

    #[test]
    fn test_end_clears_active() {
        let mut c = TransactionCoordinator::new(DeviceId::from("d"));
        let (id, _) = c
            .start(TxnKind::Initialization, Box::new(Handshake))
            .expect("started");
        let signals = c.on_result(id, &result(ReadWriteStatus::RemoteGattFailure));
        assert_eq!(
            signals,
            vec![TxnSignal::Ended {
                id,
                kind: TxnKind::Initialization,
                succeeded: false
            }]
        );
        assert!(!c.is_running());
    }

    #[test]
    fn test_stale_result_is_ignored() {
        let mut c = TransactionCoordinator::new(DeviceId::from("d"));
        let (old, _) = c
            .start(TxnKind::Authentication, Box::new(Handshake))
            .expect("started");
        c.cancel();
        c.start(TxnKind::Authentication, Box::new(Handshake));
        assert!(c.on_result(old, &result(ReadWriteStatus::Success)).is_empty());
        assert!(c.is_running());
    }

    #[test]
    fn test_first_outcome_wins() {
        let mut cx = TxnContext::new(DeviceId::from("d"), TxnKind::FirmwareUpdate);
        cx.succeed();
        cx.fail();
        assert_eq!(cx.outcome, Some(true));
    }
}
