//! Metadata façade: mutate the namespace, then log and sync the edit.

use std::sync::Arc;

use crate::config::EditLogConfig;
use crate::edit::EditOp;
use crate::editlog::FsEditLog;
use crate::namespace::FsDirectory;
use crate::types::{NameNodeResult, TxId};

/// Entry point for namespace mutations.
///
/// Each mutation is applied to the in-memory tree first, then recorded in the
/// edit log, and only reported as done once the edit is durable.
pub struct FsNamesystem {
    directory: FsDirectory,
    edit_log: Arc<FsEditLog>,
}

impl FsNamesystem {
    /// Creates a namesystem with an empty tree on top of `edit_log`.
    pub fn new(edit_log: Arc<FsEditLog>) -> Self {
        Self {
            directory: FsDirectory::new(),
            edit_log,
        }
    }

    /// Creates a namesystem whose edit log uses the configured sink.
    pub fn from_config(config: &EditLogConfig) -> NameNodeResult<Self> {
        let sink = config.open_sink()?;
        Ok(Self::new(Arc::new(FsEditLog::new(sink, config.sync_wait()))))
    }

    /// Creates every directory along `path` and makes the edit durable.
    ///
    /// Returns true once the mkdir is logged and synced.
    pub fn mkdir(&self, path: &str) -> NameNodeResult<bool> {
        let payload = EditOp::Mkdir {
            path: path.to_string(),
        }
        .encode()?;

        let outcome = self.directory.create_path(path)?;
        let txid = self.edit_log.append(payload);
        self.edit_log.await_durable(txid)?;

        tracing::debug!(
            path,
            txid = txid.as_u64(),
            created = outcome.created,
            "mkdir logged"
        );
        Ok(true)
    }

    /// Flushes any edits still buffered.
    pub fn sync_all(&self) -> NameNodeResult<TxId> {
        self.edit_log.sync_all()?;
        Ok(self.edit_log.synced_txid())
    }

    /// The namespace tree.
    pub fn directory(&self) -> &FsDirectory {
        &self.directory
    }

    /// The edit log.
    pub fn edit_log(&self) -> &Arc<FsEditLog> {
        &self.edit_log
    }
}
