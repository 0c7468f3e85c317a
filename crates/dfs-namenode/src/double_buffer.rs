//! In-memory double buffer for edit records.
//!
//! Writers append to the active buffer while a previously swapped batch is
//! being persisted. The flush leader takes the flushing buffer out, writes it
//! without holding the edit log lock, then hands the (cleared) allocation back
//! or requeues the records if the sink failed.

use crate::edit::EditRecord;
use crate::types::TxId;

/// Two alternating record buffers.
#[derive(Debug, Default)]
pub struct DoubleBuffer {
    /// Accepts new writes.
    active: Vec<EditRecord>,
    /// Batch selected for persistence.
    flushing: Vec<EditRecord>,
}

impl DoubleBuffer {
    /// Creates an empty double buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record to the active buffer.
    pub fn write(&mut self, record: EditRecord) {
        debug_assert!(
            self.active
                .last()
                .map_or(true, |last| last.txid() < record.txid()),
            "records must be written in txid order"
        );
        self.active.push(record);
    }

    /// Exchanges the roles of the two buffers.
    ///
    /// Must only be called once the previous batch has been taken out.
    pub fn swap(&mut self) {
        debug_assert!(self.flushing.is_empty(), "swap with a batch still pending");
        std::mem::swap(&mut self.active, &mut self.flushing);
    }

    /// Highest txid in the flushing buffer, if it holds anything.
    pub fn flushing_max_txid(&self) -> Option<TxId> {
        self.flushing.last().map(EditRecord::txid)
    }

    /// Lowest txid in the flushing buffer, if it holds anything.
    pub fn flushing_min_txid(&self) -> Option<TxId> {
        self.flushing.first().map(EditRecord::txid)
    }

    /// Moves the flushing batch out so it can be persisted outside the lock.
    pub fn take_flushing(&mut self) -> Vec<EditRecord> {
        std::mem::take(&mut self.flushing)
    }

    /// Returns a persisted batch's allocation to the flushing slot, emptied.
    pub fn recycle(&mut self, mut batch: Vec<EditRecord>) {
        batch.clear();
        if self.flushing.is_empty() {
            self.flushing = batch;
        }
    }

    /// Puts a batch that failed to persist back in front of newer writes.
    ///
    /// Every record in `batch` precedes every record in the active buffer, so
    /// prepending keeps the active buffer in txid order.
    pub fn requeue(&mut self, mut batch: Vec<EditRecord>) {
        batch.append(&mut self.active);
        self.active = batch;
    }

    /// Number of records waiting in the active buffer.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Number of records in the flushing buffer.
    pub fn flushing_len(&self) -> usize {
        self.flushing.len()
    }
}
