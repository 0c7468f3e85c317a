#![warn(missing_docs)]

//! DFS NameNode metadata core: in-memory namespace tree and group-commit edit log
//!
//! Mutations are applied to the [`namespace`] tree and recorded as ordered
//! transactions in the [`editlog`], which batches concurrent syncs into a
//! single flush per cycle using a [`double_buffer`].

pub mod cli;
pub mod config;
pub mod double_buffer;
pub mod edit;
pub mod editlog;
pub mod namespace;
pub mod namesystem;
pub mod rpc;
pub mod sink;
pub mod types;

pub use config::{EditLogConfig, NameNodeConfig, SinkKind};
pub use edit::{EditOp, EditRecord};
pub use editlog::{EditLogStats, FsEditLog};
pub use namespace::{FsDirectory, NamespaceTree};
pub use namesystem::FsNamesystem;
pub use rpc::NameNodeRpcServer;
pub use sink::{EditLogSink, FileSink, MemorySink};
pub use types::{EditLogError, NameNodeError, NameNodeResult, NamespaceError, NodeId, SinkError, TxId};
