//! `microloop config`: show or validate the merged configuration.

use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::{load_rule_set, ConfigLoader};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the merged configuration
    Show,
    /// Validate configuration and the governance rule set
    Validate,
}

#[derive(Debug, serde::Serialize)]
pub struct ConfigShowOutput {
    pub config: Config,
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config).unwrap_or_default()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ConfigValidateOutput {
    pub valid: bool,
    pub rules: usize,
    pub rules_digest: String,
}

impl CommandOutput for ConfigValidateOutput {
    fn to_human(&self) -> String {
        format!(
            "Configuration is valid. {} governance rule(s), digest {}",
            self.rules,
            &self.rules_digest[..12.min(self.rules_digest.len())]
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Copy of the config with credentials masked.
fn redacted(mut config: Config) -> Config {
    for key in [&mut config.worker.api_key, &mut config.embedding.api_key] {
        if key.is_some() {
            *key = Some("***".to_string());
        }
    }
    config
}

pub fn execute(args: ConfigArgs, config: Config, json_mode: bool) -> Result<ExitCode> {
    match args.command {
        ConfigCommands::Show => output(
            &ConfigShowOutput {
                config: redacted(config),
            },
            json_mode,
        ),
        ConfigCommands::Validate => {
            ConfigLoader::validate(&config)?;
            let rules = load_rule_set(&config.reviewer.rules_path)?;
            output(
                &ConfigValidateOutput {
                    valid: true,
                    rules: rules.rules.len(),
                    rules_digest: rules.digest(),
                },
                json_mode,
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}
