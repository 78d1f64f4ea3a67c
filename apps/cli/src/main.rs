//! pressgang CLI — batch driver for the content pipeline.
//!
//! One subcommand per stage (discover, acquire, extract, synthesize,
//! package) plus publication and reporting commands.

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
