mod bootstrap_helpers;
mod bot_config;
mod cli_args;
mod startup;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap_helpers::init_tracing;
use crate::bot_config::load_bot_config;
use crate::cli_args::Cli;
use crate::startup::run_alias_bot;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_bot_config(&cli.config)?;
    if cli.check_config {
        println!("{}", config.render_summary());
        return Ok(());
    }

    init_tracing(&config.logging.level);
    run_alias_bot(config).await
}
