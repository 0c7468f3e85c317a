//! Durable destinations for flushed edit log batches.
//!
//! The edit log hands each flush cycle's batch to an [`EditLogSink`] in txid
//! order. A sink must either persist the whole batch in that order or report
//! an error; it must never drop records silently.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::edit::EditRecord;
use crate::types::SinkError;

/// Append-only destination for ordered batches of edit records.
pub trait EditLogSink: Send + Sync {
    /// Persists `batch` in the given order.
    fn write_batch(&self, batch: &[EditRecord]) -> Result<(), SinkError>;
}

/// In-memory sink that keeps every batch it receives.
///
/// Used by tests and by the `memory` sink kind. Supports an artificial write
/// delay and injected failures.
#[derive(Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<EditRecord>>>,
    failures_pending: AtomicUsize,
    delay: Option<Duration>,
}

impl MemorySink {
    /// Creates an empty memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a memory sink that sleeps for `delay` on every batch.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Makes the next `count` batches fail with [`SinkError::Rejected`].
    pub fn fail_next(&self, count: usize) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    /// All batches received so far, in arrival order.
    pub fn batches(&self) -> Vec<Vec<EditRecord>> {
        self.batches.lock().clone()
    }

    /// All records received so far, flattened across batches.
    pub fn records(&self) -> Vec<EditRecord> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    /// Number of batches received so far.
    pub fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }
}

impl EditLogSink for MemorySink {
    fn write_batch(&self, batch: &[EditRecord]) -> Result<(), SinkError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let injected = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(SinkError::Rejected("injected failure".to_string()));
        }

        self.batches.lock().push(batch.to_vec());
        Ok(())
    }
}

/// File-backed sink writing length-prefixed bincode frames.
///
/// Each record is framed as a little-endian `u32` length followed by the
/// bincode encoding of the record. The file is synced once per batch.
///
/// The file only ever grows by whole, synced batches. A batch that fails to
/// write or sync is cut back off before the error is returned, and any tail
/// past the last committed batch is truncated before the next write.
pub struct FileSink {
    path: PathBuf,
    file: Mutex<EditsFile>,
    /// Bytes to write before failing the next batch.
    #[cfg(test)]
    torn_write: AtomicUsize,
}

struct EditsFile {
    file: File,
    /// Length covered by successfully synced batches.
    committed_len: u64,
}

impl EditsFile {
    fn append_batch(
        &mut self,
        buf: &[u8],
        #[allow(unused_variables)] torn_at: usize,
    ) -> std::io::Result<()> {
        if self.file.metadata()?.len() != self.committed_len {
            tracing::warn!(
                committed_len = self.committed_len,
                "truncating uncommitted tail of edits file"
            );
            self.file.set_len(self.committed_len)?;
        }

        #[cfg(test)]
        if torn_at > 0 && torn_at < buf.len() {
            self.file.write_all(&buf[..torn_at])?;
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected torn write",
            ));
        }

        self.file.write_all(buf)?;
        self.file.sync_data()
    }

    fn rollback(&mut self) {
        let result = self
            .file
            .set_len(self.committed_len)
            .and_then(|()| self.file.sync_data());
        if let Err(e) = result {
            // Retried by the length check on the next append.
            tracing::error!(
                committed_len = self.committed_len,
                error = %e,
                "failed to roll back edits file"
            );
        }
    }
}

impl FileSink {
    /// Opens (creating if needed) the edits file at `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let committed_len = file.metadata()?.len();
        tracing::info!(path = %path.display(), committed_len, "opened edits file");
        Ok(Self {
            path,
            file: Mutex::new(EditsFile {
                file,
                committed_len,
            }),
            #[cfg(test)]
            torn_write: AtomicUsize::new(0),
        })
    }

    /// Makes the next batch write only `bytes` bytes and then fail.
    #[cfg(test)]
    fn tear_next_write(&self, bytes: usize) {
        self.torn_write.store(bytes, Ordering::SeqCst);
    }

    /// Path of the edits file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record stored in the edits file at `path`, in order.
    pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<EditRecord>, SinkError> {
        let mut data = Vec::new();
        File::open(path.as_ref())?.read_to_end(&mut data)?;

        let mut records = Vec::new();
        let mut pos = 0usize;
        while pos < data.len() {
            let header = data
                .get(pos..pos + 4)
                .ok_or_else(|| SinkError::Serialization("truncated frame header".to_string()))?;
            let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
            pos += 4;

            let body = data
                .get(pos..pos + len)
                .ok_or_else(|| SinkError::Serialization("truncated frame body".to_string()))?;
            let record: EditRecord = bincode::deserialize(body)
                .map_err(|e| SinkError::Serialization(e.to_string()))?;
            records.push(record);
            pos += len;
        }
        Ok(records)
    }
}

impl EditLogSink for FileSink {
    fn write_batch(&self, batch: &[EditRecord]) -> Result<(), SinkError> {
        let mut buf = Vec::new();
        for record in batch {
            let body =
                bincode::serialize(record).map_err(|e| SinkError::Serialization(e.to_string()))?;
            let len = u32::try_from(body.len())
                .map_err(|_| SinkError::Serialization("record too large".to_string()))?;
            buf.extend_from_slice(&len.to_le_bytes());
            buf.extend_from_slice(&body);
        }

        #[cfg(test)]
        let torn_at = self.torn_write.swap(0, Ordering::SeqCst);
        #[cfg(not(test))]
        let torn_at = 0;

        let mut file = self.file.lock();
        if let Err(e) = file.append_batch(&buf, torn_at) {
            tracing::error!(
                records = batch.len(),
                error = %e,
                "edits file write failed, rolling back batch"
            );
            file.rollback();
            return Err(e.into());
        }
        file.committed_len += buf.len() as u64;

        tracing::debug!(
            records = batch.len(),
            bytes = buf.len(),
            "wrote batch to edits file"
        );
        Ok(())
    }
}
