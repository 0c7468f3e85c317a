//! NameNode configuration, loaded from TOML or JSON.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::sink::{EditLogSink, FileSink, MemorySink};
use crate::types::SinkError;

/// Which durable sink backs the edit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Keep flushed batches in memory (testing, dry runs).
    Memory,
    /// Append to the edits file.
    #[default]
    File,
}

/// Edit log settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditLogConfig {
    /// Sink backing the log
    pub sink: SinkKind,
    /// Edits file used by the file sink
    pub edits_path: PathBuf,
    /// Re-check interval for callers blocked on a flush, in milliseconds
    pub sync_wait_ms: u64,
}

impl Default for EditLogConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::File,
            edits_path: PathBuf::from("/var/lib/dfs/namenode/edits.log"),
            sync_wait_ms: 2000,
        }
    }
}

impl EditLogConfig {
    /// Re-check interval as a Duration.
    pub fn sync_wait(&self) -> Duration {
        Duration::from_millis(self.sync_wait_ms)
    }

    /// Builds the configured sink.
    pub fn open_sink(&self) -> Result<Arc<dyn EditLogSink>, SinkError> {
        Ok(match self.sink {
            SinkKind::Memory => Arc::new(MemorySink::new()),
            SinkKind::File => Arc::new(FileSink::open(&self.edits_path)?),
        })
    }
}

/// Top-level NameNode settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameNodeConfig {
    /// Address the RPC surface listens on
    pub rpc_addr: SocketAddr,
    /// Edit log settings
    pub edit_log: EditLogConfig,
}

impl Default for NameNodeConfig {
    fn default() -> Self {
        Self {
            rpc_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            edit_log: EditLogConfig::default(),
        }
    }
}

impl NameNodeConfig {
    /// Loads a config file; the extension selects TOML or JSON.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => Ok(toml::from_str(&contents)?),
            "json" => Ok(serde_json::from_str(&contents)?),
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }
}
