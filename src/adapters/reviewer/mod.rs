//! Reviewer adapters.

pub mod rule_set;
pub mod scripted;

pub use rule_set::{validate_rules, RuleSetReviewer};
pub use scripted::ScriptedReviewer;
