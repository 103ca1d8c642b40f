//! Local reviewer that evaluates regex governance rules line by line.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::errors::{PortError, PortResult};
use crate::domain::models::{
    GovernanceRule, ReviewVerdict, ReviewerConfig, RuleSet, Severity, Ticket, Violation,
};
use crate::domain::ports::Reviewer;

const SERVICE: &str = "reviewer";
const MAX_QUALITY: f64 = 10.0;

struct CompiledRule {
    rule: GovernanceRule,
    pattern: Regex,
}

/// Compile every rule's pattern, naming the first rule that fails.
fn compile(rules: &RuleSet) -> Result<Vec<CompiledRule>, String> {
    rules
        .rules
        .iter()
        .map(|rule| {
            Regex::new(&rule.pattern)
                .map(|pattern| CompiledRule {
                    rule: rule.clone(),
                    pattern,
                })
                .map_err(|e| format!("rule '{}' has an invalid pattern: {e}", rule.id))
        })
        .collect()
}

/// Check that every pattern in a rule set compiles.
pub fn validate_rules(rules: &RuleSet) -> Result<(), String> {
    compile(rules).map(|_| ())
}

/// Reviewer backed by a [`RuleSet`] of regular expressions.
///
/// Violations at or above `blocking_severity`, or a quality score under
/// `min_quality_score`, reject. Anything else with violations is approved
/// with a tech-debt tag.
pub struct RuleSetReviewer {
    blocking_severity: Severity,
    min_quality_score: f64,
    compiled: Arc<RwLock<HashMap<String, Arc<Vec<CompiledRule>>>>>,
}

impl RuleSetReviewer {
    pub fn new(config: &ReviewerConfig) -> Self {
        Self {
            blocking_severity: config.blocking_severity,
            min_quality_score: config.min_quality_score,
            compiled: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn compiled_rules(&self, rules: &RuleSet) -> PortResult<Arc<Vec<CompiledRule>>> {
        let digest = rules.digest();
        if let Some(compiled) = self.compiled.read().await.get(&digest) {
            return Ok(compiled.clone());
        }
        let compiled = Arc::new(compile(rules).map_err(|e| PortError::invalid_response(SERVICE, e))?);
        self.compiled.write().await.insert(digest, compiled.clone());
        Ok(compiled)
    }

    fn find_violations(rules: &[CompiledRule], source: &BTreeMap<String, String>) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (path, content) in source {
            for compiled in rules.iter().filter(|c| c.rule.applies_to(path)) {
                for (index, line) in content.lines().enumerate() {
                    if !compiled.pattern.is_match(line) {
                        continue;
                    }
                    let mut violation = Violation::new(
                        compiled.rule.id.clone(),
                        compiled.rule.severity,
                        compiled.rule.description.clone(),
                    )
                    .at(path.clone(), Some(index + 1));
                    if let Some(remedy) = &compiled.rule.remedy {
                        violation = violation.with_remedy(remedy.clone());
                    }
                    violations.push(violation);
                }
            }
        }
        violations
    }

    /// 10 minus the summed severity penalties, floored at zero.
    pub fn quality_score(violations: &[Violation]) -> f64 {
        let penalty: f64 = violations.iter().map(|v| v.severity.quality_penalty()).sum();
        (MAX_QUALITY - penalty).max(0.0)
    }

    fn judge(&self, violations: Vec<Violation>) -> ReviewVerdict {
        let score = Self::quality_score(&violations);
        if violations.is_empty() {
            return ReviewVerdict::approved().with_quality_score(score);
        }
        let blocking = violations
            .iter()
            .any(|v| v.severity >= self.blocking_severity);
        if blocking || score < self.min_quality_score {
            ReviewVerdict::rejected(violations).with_quality_score(score)
        } else {
            ReviewVerdict::approved_with_tech_debt(violations).with_quality_score(score)
        }
    }
}

#[async_trait]
impl Reviewer for RuleSetReviewer {
    fn name(&self) -> &'static str {
        "rule_set"
    }

    async fn review(
        &self,
        full_source: &BTreeMap<String, String>,
        rules: &RuleSet,
        ticket: &Ticket,
    ) -> PortResult<ReviewVerdict> {
        let compiled = self.compiled_rules(rules).await?;
        let violations = Self::find_violations(&compiled, full_source);
        let verdict = self.judge(violations);
        debug!(
            ticket_id = %ticket.id,
            status = verdict.status.as_str(),
            violations = verdict.violations.len(),
            "rule set review finished"
        );
        Ok(verdict)
    }
}
