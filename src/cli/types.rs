//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::commands::config::ConfigArgs;
use super::commands::run::RunArgs;
use super::commands::score::ScoreArgs;

#[derive(Parser)]
#[command(name = "microloop")]
#[command(about = "Microloop - autonomous dispatch, verification and review of coding tickets", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .microloop/config.yaml plus local overrides)
    #[arg(short, long, global = true, env = "MICROLOOP_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run tickets through the micro-loop
    Run(RunArgs),

    /// Inspect or validate configuration
    Config(ConfigArgs),

    /// Score a trajectory of snapshot files for tunneling
    Score(ScoreArgs),
}
