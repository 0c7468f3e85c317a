//! Identifiers and error types shared across the NameNode.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction identifier assigned by the edit log.
///
/// Ids start at 1 and grow by exactly one per appended record. `TxId::ZERO`
/// means "nothing yet" and is never handed out.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId(u64);

impl TxId {
    /// The id preceding every assigned transaction
    pub const ZERO: TxId = TxId(0);

    /// Creates a new TxId from a raw u64 value
    pub fn new(id: u64) -> Self {
        TxId(id)
    }

    /// Returns the raw u64 value of this transaction id
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the id that follows this one
    pub fn next(self) -> Self {
        TxId(self.0 + 1)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable index of a node inside the namespace tree arena
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    /// The root directory always occupies slot 0
    pub const ROOT: NodeId = NodeId(0);

    /// Creates a new NodeId from an arena slot
    pub fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the arena slot of this node
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors raised by namespace tree mutations and lookups
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamespaceError {
    /// A path segment resolved to a file where a directory was required.
    #[error("'{path}' is not a directory")]
    NotADirectory {
        /// Path prefix that resolved to a file
        path: String,
    },

    /// The final segment of a file creation already exists.
    #[error("'{path}' already exists")]
    EntryExists {
        /// Path that already exists
        path: String,
    },

    /// No node exists at the path.
    #[error("'{path}' not found")]
    NotFound {
        /// Path that was looked up
        path: String,
    },

    /// The path has no usable segments for an operation that needs one.
    #[error("invalid path '{0}'")]
    InvalidPath(String),
}

/// Errors reported by a durable edit log sink
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The underlying file or device failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The sink refused the batch.
    #[error("sink rejected batch: {0}")]
    Rejected(String),
}

/// Errors surfaced by the edit log manager
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditLogError {
    /// The caller asked about a transaction that was never assigned.
    #[error("txid {txid} has not been assigned (last assigned {last})")]
    UnknownTxid {
        /// Requested transaction id
        txid: TxId,
        /// Highest id assigned so far
        last: TxId,
    },

    /// The flush cycle covering the transaction failed to persist.
    #[error("sync of txids {first}..={last} failed: {reason}")]
    SyncFailed {
        /// Lowest txid of the failed batch
        first: TxId,
        /// Highest txid of the failed batch
        last: TxId,
        /// Sink error message
        reason: String,
    },

    /// A previous flush failed and no operator recovery has happened yet.
    #[error("edit log halted after failed sync: {reason}")]
    Halted {
        /// Sink error message of the failed cycle
        reason: String,
    },
}

/// Top-level error for NameNode metadata operations
#[derive(Debug, thiserror::Error)]
pub enum NameNodeError {
    /// The namespace tree rejected the mutation.
    #[error(transparent)]
    Namespace(#[from] NamespaceError),

    /// The edit log could not make the mutation durable.
    #[error(transparent)]
    EditLog(#[from] EditLogError),

    /// The durable sink failed outside of a flush cycle.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Result alias for NameNode metadata operations
pub type NameNodeResult<T> = Result<T, NameNodeError>;
