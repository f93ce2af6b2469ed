//! Regwatch CLI: monitors compliance documents for meaningful changes.
//!
//! Fetches configured sources, diffs them against their previous snapshot,
//! extracts structured findings from significant changes and scores them
//! against the consumer profile.

mod commands;
mod render;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
