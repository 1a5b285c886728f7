//! postcheck: fact-check blog posts against live web research and rewrite them.
//!
//! Runs as an HTTP service for the editor front end, or one-shot from the terminal.

mod commands;
mod routes;

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
