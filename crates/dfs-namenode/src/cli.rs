//! Command line interface for the NameNode binary.

use crate::config::NameNodeConfig;
use crate::namesystem::FsNamesystem;
use crate::rpc::NameNodeRpcServer;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// Command line for the NameNode binary.
#[derive(Parser)]
#[command(name = "dfs-namenode")]
#[command(about = "DFS NameNode metadata server", long_about = None)]
pub struct Cli {
    /// Config file (.toml or .json); defaults apply if it does not exist
    #[arg(short, long, env = "DFS_NAMENODE_CONFIG", default_value = "/etc/dfs/namenode.toml")]
    pub config: PathBuf,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// NameNode subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Start the RPC surface and run until Ctrl-C
    Serve,
    /// Create directory paths through the namesystem and exit
    Mkdir {
        /// Paths to create
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

impl Cli {
    /// Loads the config and runs the selected subcommand.
    pub async fn run(self) -> Result<()> {
        let config = self.load_config()?;
        let namesystem = Arc::new(FsNamesystem::from_config(&config.edit_log)?);
        let server = Arc::new(NameNodeRpcServer::new(namesystem.clone(), config.rpc_addr));

        match self.command {
            Command::Serve => {
                server.start();
                tokio::signal::ctrl_c().await?;
                tracing::info!("shutting down, syncing edit log");
                let synced = {
                    let namesystem = namesystem.clone();
                    tokio::task::spawn_blocking(move || namesystem.sync_all()).await??
                };
                tracing::info!(
                    txid = synced.as_u64(),
                    stats = %stats_json(&namesystem),
                    "edit log synced"
                );
                Ok(())
            }
            Command::Mkdir { paths } => {
                let results = tokio::task::spawn_blocking(move || {
                    paths
                        .into_iter()
                        .map(|path| {
                            let ok = server.create_directory_path(&path);
                            (path, ok)
                        })
                        .collect::<Vec<_>>()
                })
                .await?;

                let mut failed = 0;
                for (path, ok) in &results {
                    println!("{}\t{}", if *ok { "created" } else { "FAILED" }, path);
                    if !ok {
                        failed += 1;
                    }
                }
                if failed > 0 {
                    anyhow::bail!("{} of {} mkdir calls failed", failed, results.len());
                }
                Ok(())
            }
        }
    }

    fn load_config(&self) -> Result<NameNodeConfig> {
        if self.config.exists() {
            NameNodeConfig::from_file(&self.config)
        } else {
            tracing::warn!(
                "Config file not found, using defaults: {}",
                self.config.display()
            );
            Ok(NameNodeConfig::default())
        }
    }
}

/// Edit log counters as a JSON object, for the shutdown log line.
fn stats_json(namesystem: &FsNamesystem) -> String {
    serde_json::to_string(&namesystem.edit_log().stats())
        .unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
}
