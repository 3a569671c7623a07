//! Blogsmith CLI: scheduled blog generation.
//!
//! Chains four completion prompts (topic, outline, revised outline, post) and
//! appends the finished post to a spreadsheet, immediately and then on a
//! fixed period.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
