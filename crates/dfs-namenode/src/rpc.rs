//! Operation surface exposed to the RPC transport.
//!
//! No wire transport lives here. The server owns the configured address so a
//! transport can bind it, but never opens a socket itself.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::namesystem::FsNamesystem;

/// Calls the transport layer makes into the NameNode.
pub struct NameNodeRpcServer {
    namesystem: Arc<FsNamesystem>,
    addr: SocketAddr,
}

impl NameNodeRpcServer {
    /// Creates the RPC surface for `namesystem`, to be served at `addr`.
    pub fn new(namesystem: Arc<FsNamesystem>, addr: SocketAddr) -> Self {
        Self { namesystem, addr }
    }

    /// Creates every directory along `path`. False if the mkdir failed.
    pub fn create_directory_path(&self, path: &str) -> bool {
        match self.namesystem.mkdir(path) {
            Ok(done) => done,
            Err(e) => {
                tracing::error!(path, error = %e, "mkdir failed");
                false
            }
        }
    }

    /// Announces that the operation surface is ready for calls.
    pub fn start(&self) {
        tracing::info!(
            configured_addr = %self.addr,
            "NameNode RPC surface ready (no network transport bound)"
        );
    }

    /// Address configured for a transport to serve on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}
