//! Failure records consumed by the feedback loop.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::health::SemanticHealthMetric;
use super::verification::{TestOutcome, Violation};

/// Which gate rejected the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    TestFailure,
    ArchitectRejection,
    Tunneling,
    WorkerFailed,
}

impl FailureKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TestFailure => "test_failure",
            Self::ArchitectRejection => "architect_rejection",
            Self::Tunneling => "tunneling",
            Self::WorkerFailed => "worker_failed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a worker session ended without a usable patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum WorkerFailureReason {
    /// The worker itself reported failure
    Reported { message: Option<String> },
    /// The worker reported completion without a patch
    MissingPatch,
    /// The worker no longer knows the session
    SessionLost { session_id: String },
    /// The worker is waiting on input and no human channel is available
    Blocked { message: Option<String> },
    /// The attempt exceeded its wall-clock ceiling
    Timeout { limit_ms: u64 },
    /// The enclosing system cancelled the attempt
    Cancelled,
}

impl WorkerFailureReason {
    pub fn describe(&self) -> String {
        match self {
            Self::Reported { message } => format!(
                "worker reported failure: {}",
                message.as_deref().unwrap_or("no message")
            ),
            Self::MissingPatch => "worker reported completion without a patch".to_string(),
            Self::SessionLost { session_id } => format!("worker lost session {session_id}"),
            Self::Blocked { message } => format!(
                "worker blocked: {}",
                message.as_deref().unwrap_or("no message")
            ),
            Self::Timeout { limit_ms } => format!("attempt exceeded its {limit_ms} ms ceiling"),
            Self::Cancelled => "attempt cancelled".to_string(),
        }
    }
}

/// Evidence attached to a failure, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureEvidence {
    Tests { outcome: TestOutcome },
    Review { violations: Vec<Violation> },
    Degenerate { metric: SemanticHealthMetric },
    Worker { reason: WorkerFailureReason },
}

impl FailureEvidence {
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Tests { .. } => FailureKind::TestFailure,
            Self::Review { .. } => FailureKind::ArchitectRejection,
            Self::Degenerate { .. } => FailureKind::Tunneling,
            Self::Worker { .. } => FailureKind::WorkerFailed,
        }
    }

    pub const fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Worker {
                reason: WorkerFailureReason::Cancelled
            }
        )
    }

    /// Flattened text of the evidence, used for classification and excerpts.
    pub fn text(&self) -> String {
        match self {
            Self::Tests { outcome } => {
                let mut text = String::new();
                for name in &outcome.evidence.failing_tests {
                    text.push_str("FAILED ");
                    text.push_str(name);
                    text.push('\n');
                }
                text.push_str(&outcome.evidence.output_excerpt);
                text
            }
            Self::Review { violations } => violations
                .iter()
                .map(Violation::summary)
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Degenerate { metric } => metric.summary(),
            Self::Worker { reason } => reason.describe(),
        }
    }
}

/// Classified root cause of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCause {
    MissingImport,
    WrongFilePath,
    SyntaxError,
    AssertionMismatch,
    FlakyAssumption,
    ArchitectureViolation,
    DegenerateLoop,
    WorkerCrash,
    Timeout,
    Cancelled,
    Blocked,
    Unknown,
}

impl RootCause {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingImport => "missing_import",
            Self::WrongFilePath => "wrong_file_path",
            Self::SyntaxError => "syntax_error",
            Self::AssertionMismatch => "assertion_mismatch",
            Self::FlakyAssumption => "flaky_assumption",
            Self::ArchitectureViolation => "architecture_violation",
            Self::DegenerateLoop => "degenerate_loop",
            Self::WorkerCrash => "worker_crash",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Blocked => "blocked",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RootCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a ticket's failure history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    /// Dispatch number of the attempt that failed
    pub attempt: u32,
    pub root_cause: RootCause,
    pub evidence: FailureEvidence,
    /// Corrective instructions generated for the next attempt
    pub instructions: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(
        attempt: u32,
        root_cause: RootCause,
        evidence: FailureEvidence,
        instructions: Vec<String>,
    ) -> Self {
        Self {
            kind: evidence.kind(),
            attempt,
            root_cause,
            evidence,
            instructions,
            recorded_at: Utc::now(),
        }
    }
}
