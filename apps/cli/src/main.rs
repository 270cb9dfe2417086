//! Refinery CLI: run the enrichment services locally or against the cloud
//! backends.
//!
//! Each service normally runs as a cloud function triggered by a pub/sub
//! message; `refinery run` feeds it the same event from a file or stdin.

mod commands;

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
