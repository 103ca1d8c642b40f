//! Governance rule-set loading.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use crate::adapters::reviewer::validate_rules;
use crate::domain::models::RuleSet;

/// Load a YAML rule set, checking that every pattern compiles.
///
/// A missing file yields an empty rule set, which approves everything.
pub fn load_rule_set(path: impl AsRef<Path>) -> Result<RuleSet> {
    let path = path.as_ref();
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "rule set not found, reviewing without rules");
            return Ok(RuleSet::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read rule set {}", path.display()))
        }
    };

    let rules: RuleSet = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse rule set {}", path.display()))?;
    validate_rules(&rules).map_err(|e| anyhow!("{}: {e}", path.display()))?;

    info!(
        path = %path.display(),
        rules = rules.rules.len(),
        digest = %rules.digest(),
        "Loaded governance rule set"
    );
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Severity;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_rule_set_from_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
name: core
rules:
  - id: no-unwrap
    description: unwrap in library code
    severity: critical
    pattern: '\.unwrap\(\)'
    file_suffixes: [".rs"]
    remedy: propagate the error with ?
"#
        )
        .unwrap();

        let rules = load_rule_set(file.path()).unwrap();
        assert_eq!(rules.name.as_deref(), Some("core"));
        assert_eq!(rules.rules[0].severity, Severity::Critical);
        assert!(rules.rules[0].applies_to("src/lib.rs"));
    }

    #[test]
    fn test_missing_rule_set_is_empty() {
        let rules = load_rule_set("/nonexistent/rules.yaml").unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "rules:\n  - id: bad\n    description: d\n    severity: minor\n    pattern: '(oops'"
        )
        .unwrap();
        let err = load_rule_set(file.path()).unwrap_err();
        assert!(err.to_string().contains("bad"));
    }
}
