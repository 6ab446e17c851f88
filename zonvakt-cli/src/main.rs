//! ## zonvakt-cli
//! **Operator entrypoint**
//!
//! Validates configuration, inspects persisted zone history and runs a
//! simulated zone end to end (engine, relay, in-memory central service).

use clap::Parser;

mod commands;
mod simulate;

use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::run_command(cli).await
}
