#![warn(missing_docs)]

//! DFS NameNode server

use clap::Parser;
use dfs_namenode::cli::Cli;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    tracing::info!("DFS NameNode starting...");

    Cli::parse().run().await
}
