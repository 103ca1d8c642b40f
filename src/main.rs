//! Microloop CLI entry point.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use microloop::cli::commands;
use microloop::cli::{handle_error, Cli, Commands};
use microloop::infrastructure::config::ConfigLoader;
use microloop::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_mode = cli.json;

    match execute(cli).await {
        Ok(code) => code,
        Err(err) => handle_error(&err, json_mode),
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args, config, cli.json).await,
        Commands::Config(args) => commands::config::execute(args, config, cli.json),
        Commands::Score(args) => commands::score::execute(args, config, cli.json).await,
    }
}
