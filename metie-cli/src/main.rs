//! Binary crate for the `metie` forecast poller.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Logging setup and signal handling
//! - Serving the metrics registry

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod exporter;
mod shutdown;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();

    let default_level = if cmd.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    cmd.run().await
}
