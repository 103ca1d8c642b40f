//! Verification results: test outcomes, governance rules, review verdicts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Evidence captured from a test run, passed verbatim to the feedback loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestEvidence {
    pub failing_tests: Vec<String>,
    pub output_excerpt: String,
    pub exit_code: Option<i32>,
    pub passed_count: u32,
    pub failed_count: u32,
}

/// Result of running the test suite against one candidate patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub passed: bool,
    pub evidence: TestEvidence,
    pub patch_digest: String,
    pub ran_at: DateTime<Utc>,
    /// The run was cut short by the runner's time limit
    #[serde(default)]
    pub timed_out: bool,
}

impl TestOutcome {
    pub fn passing(patch_digest: impl Into<String>, evidence: TestEvidence) -> Self {
        Self {
            passed: true,
            evidence,
            patch_digest: patch_digest.into(),
            ran_at: Utc::now(),
            timed_out: false,
        }
    }

    pub fn failing(patch_digest: impl Into<String>, evidence: TestEvidence) -> Self {
        Self {
            passed: false,
            evidence,
            patch_digest: patch_digest.into(),
            ran_at: Utc::now(),
            timed_out: false,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self) -> Self {
        self.timed_out = true;
        self
    }

    /// Whether re-running the suite on the same patch must give the same result.
    pub const fn is_deterministic(&self) -> bool {
        !self.timed_out
    }
}

/// Severity of a governance violation, ordered from least to most serious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Minor,
    Major,
    Critical,
}

impl Severity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Minor => "minor",
            Self::Major => "major",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "minor" => Some(Self::Minor),
            "major" => Some(Self::Major),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Points deducted from a 10-point quality score per violation.
    pub const fn quality_penalty(&self) -> f64 {
        match self {
            Self::Info => 0.0,
            Self::Minor => 0.5,
            Self::Major => 1.5,
            Self::Critical => 4.0,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationLocation {
    pub file: String,
    pub line: Option<usize>,
}

impl fmt::Display for ViolationLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{line}", self.file),
            None => f.write_str(&self.file),
        }
    }
}

/// A single breach of a governance rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub severity: Severity,
    #[serde(default)]
    pub location: Option<ViolationLocation>,
    pub description: String,
    #[serde(default)]
    pub suggested_remedy: Option<String>,
}

impl Violation {
    pub fn new(rule_id: impl Into<String>, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity,
            location: None,
            description: description.into(),
            suggested_remedy: None,
        }
    }

    #[must_use]
    pub fn at(mut self, file: impl Into<String>, line: Option<usize>) -> Self {
        self.location = Some(ViolationLocation {
            file: file.into(),
            line,
        });
        self
    }

    #[must_use]
    pub fn with_remedy(mut self, remedy: impl Into<String>) -> Self {
        self.suggested_remedy = Some(remedy.into());
        self
    }

    /// One-line human summary, e.g. `[major] no-unwrap: unwrap in library code (src/lib.rs:4)`.
    pub fn summary(&self) -> String {
        let mut line = format!("[{}] {}: {}", self.severity, self.rule_id, self.description);
        if let Some(location) = &self.location {
            line.push_str(&format!(" ({location})"));
        }
        line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Approved,
    Rejected,
    ApprovedWithTechDebt,
}

impl ReviewStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::ApprovedWithTechDebt => "approved_with_tech_debt",
        }
    }

    pub const fn is_approval(&self) -> bool {
        matches!(self, Self::Approved | Self::ApprovedWithTechDebt)
    }
}

/// Marker attached to an accepted patch whose violations were deferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechDebtTag {
    pub note: String,
    pub violations: Vec<Violation>,
}

impl TechDebtTag {
    pub const PREFIX: &'static str = "#TODO: Tech Debt";

    pub fn from_violations(violations: Vec<Violation>) -> Self {
        let note = if violations.is_empty() {
            Self::PREFIX.to_string()
        } else {
            let details = violations
                .iter()
                .map(|v| format!("{} ({})", v.description, v.rule_id))
                .collect::<Vec<_>>()
                .join("; ");
            format!("{} - {details}", Self::PREFIX)
        };
        Self { note, violations }
    }
}

/// The reviewer's judgement of a candidate's full resulting source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub status: ReviewStatus,
    #[serde(default)]
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub tech_debt_tag: Option<TechDebtTag>,
    /// 0.0 to 10.0 when the reviewer grades quality
    #[serde(default)]
    pub quality_score: Option<f64>,
}

impl ReviewVerdict {
    pub const fn approved() -> Self {
        Self {
            status: ReviewStatus::Approved,
            violations: Vec::new(),
            tech_debt_tag: None,
            quality_score: None,
        }
    }

    pub const fn rejected(violations: Vec<Violation>) -> Self {
        Self {
            status: ReviewStatus::Rejected,
            violations,
            tech_debt_tag: None,
            quality_score: None,
        }
    }

    pub fn approved_with_tech_debt(violations: Vec<Violation>) -> Self {
        Self {
            status: ReviewStatus::ApprovedWithTechDebt,
            tech_debt_tag: Some(TechDebtTag::from_violations(violations.clone())),
            violations,
            quality_score: None,
        }
    }

    #[must_use]
    pub fn with_quality_score(mut self, score: f64) -> Self {
        self.quality_score = Some(score);
        self
    }

    /// Ensure a tech-debt verdict carries its tag.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.status == ReviewStatus::ApprovedWithTechDebt && self.tech_debt_tag.is_none() {
            self.tech_debt_tag = Some(TechDebtTag::from_violations(self.violations.clone()));
        }
        self
    }
}

/// One governance rule evaluated by the reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceRule {
    pub id: String,
    pub description: String,
    pub severity: Severity,
    /// Regular expression; a match on any line is a violation
    pub pattern: String,
    /// Restrict the rule to files ending in one of these suffixes
    #[serde(default)]
    pub file_suffixes: Vec<String>,
    #[serde(default)]
    pub remedy: Option<String>,
}

impl GovernanceRule {
    pub fn applies_to(&self, path: &str) -> bool {
        self.file_suffixes.is_empty() || self.file_suffixes.iter().any(|s| path.ends_with(s.as_str()))
    }
}

/// The governance rule set handed to the reviewer on every review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rules: Vec<GovernanceRule>,
}

impl RuleSet {
    pub const fn new(rules: Vec<GovernanceRule>) -> Self {
        Self { name: None, rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Integrity digest of the rule set, logged with every review.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for rule in &self.rules {
            for field in [&rule.id, &rule.pattern, &rule.description] {
                hasher.update(field.as_bytes());
                hasher.update(&[0]);
            }
            hasher.update(rule.severity.as_str().as_bytes());
            for suffix in &rule.file_suffixes {
                hasher.update(suffix.as_bytes());
            }
            hasher.update(&[0xff]);
        }
        hasher.finalize().to_hex().to_string()
    }
}
