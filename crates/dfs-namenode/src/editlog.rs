//! Edit log manager with group commit.
//!
//! Writers call [`FsEditLog::append`] to get a txid and then, when they need
//! durability, [`FsEditLog::await_durable`] with that txid. At most one flush
//! cycle runs at a time:
//!
//! - The first caller to find the log idle becomes the leader: it swaps the
//!   double buffer, records the batch watermark, and writes the batch to the
//!   sink with the lock released so appends keep flowing.
//! - Callers whose txid is inside the in-flight batch wait for that cycle.
//! - One caller with a newer txid registers as the next leader; everyone else
//!   arriving during the flush coalesces behind it and waits, since their
//!   records will be captured by the next swap.
//!
//! A failed sink write halts the log: every caller covered by the failed batch
//! gets [`EditLogError::SyncFailed`], the batch is requeued ahead of newer
//! records, and no further leadership is granted until [`FsEditLog::recover`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::double_buffer::DoubleBuffer;
use crate::edit::EditRecord;
use crate::sink::EditLogSink;
use crate::types::{EditLogError, SinkError, TxId};

/// Default interval between re-checks while blocked on a flush.
pub const DEFAULT_SYNC_WAIT: Duration = Duration::from_millis(2000);

/// Where the current flush cycle stands.
#[derive(Clone, Debug, PartialEq, Eq)]
enum SyncPhase {
    /// No flush in flight.
    Idle,
    /// A leader is persisting txids `first..=watermark`.
    Flushing { first: TxId, watermark: TxId },
    /// The batch `first..=last` failed to persist.
    Halted {
        first: TxId,
        last: TxId,
        reason: String,
    },
}

/// Counters describing edit log activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditLogStats {
    /// Records appended.
    pub appended: u64,
    /// Flush cycles that persisted successfully.
    pub flush_cycles: u64,
    /// Records handed to the sink by successful cycles.
    pub records_flushed: u64,
    /// Callers that waited behind a registered next leader.
    pub coalesced_waits: u64,
    /// Flush cycles that failed.
    pub failed_cycles: u64,
}

/// Error for a caller that finds the log halted.
fn halted_error(txid: TxId, first: TxId, last: TxId, reason: &str) -> EditLogError {
    if txid >= first && txid <= last {
        EditLogError::SyncFailed {
            first,
            last,
            reason: reason.to_string(),
        }
    } else {
        EditLogError::Halted {
            reason: reason.to_string(),
        }
    }
}

struct EditLogState {
    last_txid: TxId,
    synced_txid: TxId,
    buffer: DoubleBuffer,
    phase: SyncPhase,
    waiter_registered: bool,
    stats: EditLogStats,
}

/// The edit log manager.
pub struct FsEditLog {
    state: Mutex<EditLogState>,
    synced: Condvar,
    sink: Arc<dyn EditLogSink>,
    sync_wait: Duration,
}

impl FsEditLog {
    /// Creates an edit log writing to `sink`.
    ///
    /// `sync_wait` bounds each individual wait while blocked on a flush; waits
    /// that time out simply re-check the state.
    pub fn new(sink: Arc<dyn EditLogSink>, sync_wait: Duration) -> Self {
        Self {
            state: Mutex::new(EditLogState {
                last_txid: TxId::ZERO,
                synced_txid: TxId::ZERO,
                buffer: DoubleBuffer::new(),
                phase: SyncPhase::Idle,
                waiter_registered: false,
                stats: EditLogStats::default(),
            }),
            synced: Condvar::new(),
            sink,
            sync_wait,
        }
    }

    /// Records an edit in the active buffer and returns its txid.
    ///
    /// Never blocks on I/O.
    pub fn append(&self, payload: Vec<u8>) -> TxId {
        let mut state = self.state.lock();
        let txid = state.last_txid.next();
        state.last_txid = txid;
        state.buffer.write(EditRecord::new(txid, payload));
        state.stats.appended += 1;
        tracing::debug!(txid = txid.as_u64(), "appended edit");
        txid
    }

    /// Blocks until every record up to `txid` has been handed to the sink.
    pub fn await_durable(&self, txid: TxId) -> Result<(), EditLogError> {
        let mut state = self.state.lock();
        if txid > state.last_txid {
            return Err(EditLogError::UnknownTxid {
                txid,
                last: state.last_txid,
            });
        }

        let mut coalesced = false;
        loop {
            if state.synced_txid >= txid {
                return Ok(());
            }

            let in_flight = match &state.phase {
                SyncPhase::Idle => None,
                SyncPhase::Flushing { watermark, .. } => Some(*watermark),
                SyncPhase::Halted {
                    first,
                    last,
                    reason,
                } => return Err(halted_error(txid, *first, *last, reason)),
            };
            let Some(watermark) = in_flight else {
                return self.lead_flush(state);
            };

            if txid <= watermark {
                // Covered by the batch in flight.
                self.synced.wait_for(&mut state, self.sync_wait);
            } else if state.waiter_registered {
                if !coalesced {
                    coalesced = true;
                    state.stats.coalesced_waits += 1;
                    tracing::debug!(txid = txid.as_u64(), "coalesced behind registered waiter");
                }
                self.synced.wait_for(&mut state, self.sync_wait);
            } else {
                state.waiter_registered = true;
                while matches!(state.phase, SyncPhase::Flushing { .. }) {
                    self.synced.wait_for(&mut state, self.sync_wait);
                }
                state.waiter_registered = false;
            }
        }
    }

    /// Makes everything appended so far durable.
    pub fn sync_all(&self) -> Result<(), EditLogError> {
        let last = self.last_txid();
        if last == TxId::ZERO {
            return Ok(());
        }
        self.await_durable(last)
    }

    /// Runs one flush cycle as leader. Called with the log idle.
    fn lead_flush(&self, mut state: MutexGuard<'_, EditLogState>) -> Result<(), EditLogError> {
        state.buffer.swap();
        let (Some(first), Some(watermark)) = (
            state.buffer.flushing_min_txid(),
            state.buffer.flushing_max_txid(),
        ) else {
            // Nothing pending: everything up to last_txid is already synced.
            return Ok(());
        };
        state.phase = SyncPhase::Flushing { first, watermark };
        let batch = state.buffer.take_flushing();

        tracing::debug!(
            first = first.as_u64(),
            watermark = watermark.as_u64(),
            records = batch.len(),
            "flushing edit batch"
        );

        // A panicking sink fails the cycle like any other sink error, so the
        // phase never stays stuck in Flushing.
        let result = MutexGuard::unlocked(&mut state, || {
            panic::catch_unwind(AssertUnwindSafe(|| self.sink.write_batch(&batch)))
                .unwrap_or_else(|cause| Err(SinkError::Rejected(panic_message(&*cause))))
        });

        let outcome = match result {
            Ok(()) => {
                state.stats.flush_cycles += 1;
                state.stats.records_flushed += batch.len() as u64;
                state.buffer.recycle(batch);
                state.synced_txid = watermark;
                state.phase = SyncPhase::Idle;
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(
                    first = first.as_u64(),
                    last = watermark.as_u64(),
                    error = %reason,
                    "edit batch failed to persist, halting edit log"
                );
                state.stats.failed_cycles += 1;
                state.buffer.requeue(batch);
                state.phase = SyncPhase::Halted {
                    first,
                    last: watermark,
                    reason: reason.clone(),
                };
                Err(EditLogError::SyncFailed {
                    first,
                    last: watermark,
                    reason,
                })
            }
        };

        self.synced.notify_all();
        outcome
    }

    /// Clears a halt left by a failed flush so the requeued records can be
    /// retried. Returns false if the log was not halted.
    pub fn recover(&self) -> bool {
        let mut state = self.state.lock();
        if let SyncPhase::Halted { first, last, .. } = &state.phase {
            tracing::info!(
                first = first.as_u64(),
                last = last.as_u64(),
                "edit log recovered, failed batch will be retried"
            );
            state.phase = SyncPhase::Idle;
            self.synced.notify_all();
            true
        } else {
            false
        }
    }

    /// Highest txid assigned so far.
    pub fn last_txid(&self) -> TxId {
        self.state.lock().last_txid
    }

    /// Highest txid known to be persisted.
    pub fn synced_txid(&self) -> TxId {
        self.state.lock().synced_txid
    }

    /// True while a flush cycle is in flight.
    pub fn is_flushing(&self) -> bool {
        matches!(self.state.lock().phase, SyncPhase::Flushing { .. })
    }

    /// True after a failed flush until [`FsEditLog::recover`] is called.
    pub fn is_halted(&self) -> bool {
        matches!(self.state.lock().phase, SyncPhase::Halted { .. })
    }

    /// Number of records appended but not yet persisted.
    pub fn pending_count(&self) -> u64 {
        let state = self.state.lock();
        state.last_txid.as_u64() - state.synced_txid.as_u64()
    }

    /// Snapshot of the activity counters.
    pub fn stats(&self) -> EditLogStats {
        self.state.lock().stats.clone()
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> String {
    let detail = cause
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| cause.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause");
    format!("sink panicked: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn make_log(sink: &Arc<MemorySink>) -> Arc<FsEditLog> {
        Arc::new(FsEditLog::new(sink.clone(), Duration::from_millis(50)))
    }

    fn wait_until_flushing(log: &FsEditLog) {
        while !log.is_flushing() {
            thread::yield_now();
        }
    }

    fn payloads(records: &[EditRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| String::from_utf8(r.payload().to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn test_append_assigns_sequential_txids() {
        let sink = Arc::new(MemorySink::new());
        let log = make_log(&sink);

        for expected in 1..=5 {
            assert_eq!(log.append(b"op".to_vec()), TxId::new(expected));
        }
        assert_eq!(log.last_txid(), TxId::new(5));
        assert_eq!(log.synced_txid(), TxId::ZERO);
        assert_eq!(log.pending_count(), 5);
        assert_eq!(sink.batch_count(), 0);
    }

    #[test]
    fn test_await_durable_flushes_single_batch() {
        let sink = Arc::new(MemorySink::new());
        let log = make_log(&sink);

        assert_eq!(log.append(b"op1".to_vec()), TxId::new(1));
        assert_eq!(log.append(b"op2".to_vec()), TxId::new(2));
        log.await_durable(TxId::new(2)).unwrap();

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(payloads(&batches[0]), vec!["op1", "op2"]);
        assert_eq!(log.synced_txid(), TxId::new(2));
        assert_eq!(log.pending_count(), 0);
    }

    #[test]
    fn test_await_already_synced_is_noop() {
        let sink = Arc::new(MemorySink::new());
        let log = make_log(&sink);

        let txid = log.append(b"op1".to_vec());
        log.await_durable(txid).unwrap();
        log.await_durable(txid).unwrap();

        assert_eq!(sink.batch_count(), 1);
        assert_eq!(log.stats().flush_cycles, 1);
    }

    #[test]
    fn test_await_unknown_txid() {
        let sink = Arc::new(MemorySink::new());
        let log = make_log(&sink);
        log.append(b"op1".to_vec());

        match log.await_durable(TxId::new(5)) {
            Err(EditLogError::UnknownTxid { txid, last }) => {
                assert_eq!(txid, TxId::new(5));
                assert_eq!(last, TxId::new(1));
            }
            other => panic!("expected UnknownTxid, got {:?}", other),
        }
    }

    #[test]
    fn test_sync_all_on_empty_log() {
        let sink = Arc::new(MemorySink::new());
        let log = make_log(&sink);
        log.sync_all().unwrap();
        assert_eq!(sink.batch_count(), 0);
    }

    #[test]
    fn test_appends_continue_during_flush() {
        let sink = Arc::new(MemorySink::with_delay(Duration::from_millis(150)));
        let log = make_log(&sink);

        let first = log.append(b"op1".to_vec());
        let leader = {
            let log = log.clone();
            thread::spawn(move || log.await_durable(first))
        };
        wait_until_flushing(&log);

        // Lands in the new active buffer while the leader is writing.
        let second = log.append(b"op2".to_vec());
        assert!(log.is_flushing());
        assert_eq!(second, TxId::new(2));

        leader.join().unwrap().unwrap();
        assert_eq!(log.synced_txid(), TxId::new(1));

        log.await_durable(second).unwrap();
        let batches = sink.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(payloads(&batches[0]), vec!["op1"]);
        assert_eq!(payloads(&batches[1]), vec!["op2"]);
    }

    #[test]
    fn test_waiters_during_flush_coalesce_into_one_cycle() {
        let sink = Arc::new(MemorySink::with_delay(Duration::from_millis(200)));
        let log = make_log(&sink);

        let first = log.append(b"op0".to_vec());
        let leader = {
            let log = log.clone();
            thread::spawn(move || log.await_durable(first))
        };
        wait_until_flushing(&log);

        let handles: Vec<_> = (1..=8)
            .map(|i| {
                let log = log.clone();
                thread::spawn(move || {
                    let txid = log.append(format!("op{}", i).into_bytes());
                    log.await_durable(txid)
                })
            })
            .collect();

        leader.join().unwrap().unwrap();
        for h in handles {
            h.join().unwrap().unwrap();
        }

        assert_eq!(sink.batch_count(), 2);
        assert_eq!(sink.batches()[1].len(), 8);
        let stats = log.stats();
        assert_eq!(stats.flush_cycles, 2);
        assert_eq!(stats.records_flushed, 9);
    }

    #[test]
    fn test_concurrent_writers_persist_in_order_without_gaps() {
        let sink = Arc::new(MemorySink::new());
        let log = make_log(&sink);

        let handles: Vec<_> = (0..10)
            .map(|t| {
                let log = log.clone();
                thread::spawn(move || {
                    for i in 0..20 {
                        let txid = log.append(format!("t{}-{}", t, i).into_bytes());
                        log.await_durable(txid).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let txids: Vec<u64> = sink.records().iter().map(|r| r.txid().as_u64()).collect();
        let expected: Vec<u64> = (1..=200).collect();
        assert_eq!(txids, expected);
        assert!(sink.batch_count() <= 200);
        assert_eq!(log.synced_txid(), TxId::new(200));
    }

    #[test]
    fn test_failed_flush_halts_and_retains_records() {
        let sink = Arc::new(MemorySink::new());
        let log = make_log(&sink);

        let t1 = log.append(b"op1".to_vec());
        let t2 = log.append(b"op2".to_vec());
        sink.fail_next(1);

        match log.await_durable(t2) {
            Err(EditLogError::SyncFailed { first, last, .. }) => {
                assert_eq!(first, t1);
                assert_eq!(last, t2);
            }
            other => panic!("expected SyncFailed, got {:?}", other),
        }
        assert!(log.is_halted());
        assert_eq!(log.synced_txid(), TxId::ZERO);

        // Still accepting appends, but no leadership until recovery.
        let t3 = log.append(b"op3".to_vec());
        assert!(matches!(
            log.await_durable(t3),
            Err(EditLogError::Halted { .. })
        ));
        assert!(matches!(
            log.await_durable(t1),
            Err(EditLogError::SyncFailed { .. })
        ));

        assert!(log.recover());
        assert!(!log.recover());
        log.await_durable(t3).unwrap();

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(payloads(&batches[0]), vec!["op1", "op2", "op3"]);
        assert_eq!(log.stats().failed_cycles, 1);
    }

    #[test]
    fn test_failure_reaches_waiters_of_the_cycle() {
        let sink = Arc::new(MemorySink::with_delay(Duration::from_millis(150)));
        sink.fail_next(1);
        let log = make_log(&sink);

        let first = log.append(b"op1".to_vec());
        let leader = {
            let log = log.clone();
            thread::spawn(move || log.await_durable(first))
        };
        wait_until_flushing(&log);

        // Same txid, inside the in-flight batch.
        let covered = {
            let log = log.clone();
            thread::spawn(move || log.await_durable(first))
        };
        let later = {
            let log = log.clone();
            thread::spawn(move || {
                let txid = log.append(b"op2".to_vec());
                log.await_durable(txid)
            })
        };

        assert!(matches!(
            leader.join().unwrap(),
            Err(EditLogError::SyncFailed { .. })
        ));
        assert!(matches!(
            covered.join().unwrap(),
            Err(EditLogError::SyncFailed { .. })
        ));
        assert!(later.join().unwrap().is_err());
        assert_eq!(sink.batch_count(), 0);
        assert_eq!(log.pending_count(), 2);
    }

    /// Sink that records how many `write_batch` calls overlap.
    #[derive(Default)]
    struct OverlapSink {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        records: AtomicUsize,
    }

    impl EditLogSink for OverlapSink {
        fn write_batch(&self, batch: &[EditRecord]) -> Result<(), SinkError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
            self.records.fetch_add(batch.len(), Ordering::SeqCst);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct PanickingSink;

    impl EditLogSink for PanickingSink {
        fn write_batch(&self, _batch: &[EditRecord]) -> Result<(), SinkError> {
            panic!("device vanished");
        }
    }

    #[test]
    fn test_at_most_one_flush_in_flight() {
        let sink = Arc::new(OverlapSink::default());
        let log = Arc::new(FsEditLog::new(sink.clone(), Duration::from_millis(50)));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let log = log.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        let txid = log.append(b"op".to_vec());
                        log.await_durable(txid).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(sink.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(sink.records.load(Ordering::SeqCst), 800);
        assert_eq!(log.synced_txid(), TxId::new(800));
    }

    #[test]
    fn test_sink_panic_halts_instead_of_hanging() {
        let log = FsEditLog::new(Arc::new(PanickingSink), Duration::from_millis(50));
        let txid = log.append(b"op1".to_vec());

        match log.await_durable(txid) {
            Err(EditLogError::SyncFailed { first, last, reason }) => {
                assert_eq!((first, last), (txid, txid));
                assert!(reason.contains("device vanished"));
            }
            other => panic!("expected SyncFailed, got {:?}", other),
        }
        assert!(log.is_halted());
        assert!(!log.is_flushing());
        assert_eq!(log.pending_count(), 1);
        assert_eq!(log.stats().failed_cycles, 1);
    }

    #[test]
    fn test_stats_serialize_to_json() {
        let sink = Arc::new(MemorySink::new());
        let log = make_log(&sink);
        let txid = log.append(b"op1".to_vec());
        log.await_durable(txid).unwrap();

        let json: serde_json::Value = serde_json::to_value(log.stats()).unwrap();
        assert_eq!(json["appended"], 1);
        assert_eq!(json["flush_cycles"], 1);
        assert_eq!(json["records_flushed"], 1);
        assert_eq!(json["failed_cycles"], 0);

        let back: EditLogStats = serde_json::from_value(json).unwrap();
        assert_eq!(back.appended, 1);
    }
}
