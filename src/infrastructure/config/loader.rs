use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid tunneling_threshold: {0}. Must be between 0.0 and 10.0")]
    InvalidTunnelingThreshold(f64),

    #[error("Invalid similarity_threshold: {0}. Must be between 0.0 and 1.0")]
    InvalidSimilarityThreshold(f64),

    #[error("Invalid window_size: {0}. Must be at least 2")]
    InvalidWindowSize(usize),

    #[error("Invalid retry_ceiling: {0}. Must be at most 20")]
    InvalidRetryCeiling(u32),

    #[error("Invalid tunneling_retry_cost: {0}. Must be at least 1")]
    InvalidTunnelingCost(u32),

    #[error(
        "Invalid polling configuration: initial_interval_ms ({0}) must be positive and at most max_interval_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid polling multiplier: {0}. Must be at least 1.0")]
    InvalidMultiplier(f64),

    #[error("Invalid attempt_timeout_ms: {0}. Must be positive")]
    InvalidAttemptTimeout(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Worker base_url cannot be empty")]
    EmptyWorkerUrl,

    #[error("Test runner program cannot be empty")]
    EmptyTestProgram,

    #[error("Invalid embedding dimension: {0}. Must be at least 8")]
    InvalidEmbeddingDimension(usize),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .microloop/config.yaml (project config)
    /// 3. .microloop/local.yaml (project local overrides, optional)
    /// 4. Environment variables (MICROLOOP_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".microloop/config.yaml"))
            .merge(Yaml::file(".microloop/local.yaml"))
            .merge(Env::prefixed("MICROLOOP_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring environment overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("MICROLOOP_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let policy = &config.loop_policy;
        if !(0.0..=10.0).contains(&policy.tunneling_threshold) {
            return Err(ConfigError::InvalidTunnelingThreshold(
                policy.tunneling_threshold,
            ));
        }
        if !(0.0..=1.0).contains(&policy.similarity_threshold) {
            return Err(ConfigError::InvalidSimilarityThreshold(
                policy.similarity_threshold,
            ));
        }
        if policy.window_size < 2 {
            return Err(ConfigError::InvalidWindowSize(policy.window_size));
        }
        if policy.retry_ceiling > 20 {
            return Err(ConfigError::InvalidRetryCeiling(policy.retry_ceiling));
        }
        if policy.tunneling_retry_cost == 0 {
            return Err(ConfigError::InvalidTunnelingCost(policy.tunneling_retry_cost));
        }

        let polling = &config.polling;
        if polling.initial_interval_ms == 0 || polling.initial_interval_ms > polling.max_interval_ms {
            return Err(ConfigError::InvalidBackoff(
                polling.initial_interval_ms,
                polling.max_interval_ms,
            ));
        }
        if polling.multiplier < 1.0 {
            return Err(ConfigError::InvalidMultiplier(polling.multiplier));
        }
        if polling.attempt_timeout_ms == 0 {
            return Err(ConfigError::InvalidAttemptTimeout(polling.attempt_timeout_ms));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.worker.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyWorkerUrl);
        }
        if config.test_runner.program.trim().is_empty() {
            return Err(ConfigError::EmptyTestProgram);
        }
        if config.embedding.dimension < 8 {
            return Err(ConfigError::InvalidEmbeddingDimension(
                config.embedding.dimension,
            ));
        }
        if !(0.0..=10.0).contains(&config.reviewer.min_quality_score) {
            return Err(ConfigError::ValidationFailed(format!(
                "reviewer.min_quality_score {} must be between 0.0 and 10.0",
                config.reviewer.min_quality_score
            )));
        }

        Ok(())
    }
}
