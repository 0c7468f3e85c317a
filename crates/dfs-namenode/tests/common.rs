//! Common test utilities and fixtures for integration tests.

use std::sync::Arc;
use std::time::Duration;

use dfs_namenode::{EditRecord, FsEditLog, FsNamesystem, MemorySink};

/// Re-check interval used by test edit logs
pub const TEST_SYNC_WAIT: Duration = Duration::from_millis(20);

/// A namesystem wired to an in-memory sink
pub struct TestNameNode {
    pub sink: Arc<MemorySink>,
    pub namesystem: Arc<FsNamesystem>,
}

impl TestNameNode {
    /// Create a namenode whose sink writes immediately
    pub fn new() -> Self {
        Self::with_sink(MemorySink::new())
    }

    /// Create a namenode whose sink takes `delay` per batch
    pub fn with_sink_delay(delay: Duration) -> Self {
        Self::with_sink(MemorySink::with_delay(delay))
    }

    fn with_sink(sink: MemorySink) -> Self {
        let sink = Arc::new(sink);
        let log = Arc::new(FsEditLog::new(sink.clone(), TEST_SYNC_WAIT));
        Self {
            sink,
            namesystem: Arc::new(FsNamesystem::new(log)),
        }
    }

    pub fn edit_log(&self) -> &Arc<FsEditLog> {
        self.namesystem.edit_log()
    }
}

/// Txids of the given records, in order
pub fn txids(records: &[EditRecord]) -> Vec<u64> {
    records.iter().map(|r| r.txid().as_u64()).collect()
}

/// Assert that persisted records form the gap-free sequence 1..=last
pub fn assert_gap_free(records: &[EditRecord], last: u64) {
    let expected: Vec<u64> = (1..=last).collect();
    assert_eq!(txids(records), expected);
}
