mod auth;
mod cli;
mod config;
mod error;
mod outcome;
mod output;
mod providers;
mod tools;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting ci-triage");
    cli.execute().await?;

    Ok(())
}
