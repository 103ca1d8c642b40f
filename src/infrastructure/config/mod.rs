//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading
//! - Environment variable overrides
//! - Configuration validation
//! - Governance rule-set loading

pub mod loader;
pub mod rules;

pub use loader::{ConfigError, ConfigLoader};
pub use rules::load_rule_set;
