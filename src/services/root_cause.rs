//! Root-cause classification of failure evidence.

use regex::Regex;

use crate::domain::models::{FailureEvidence, RootCause, WorkerFailureReason};

/// Regex classifier over test output.
///
/// Patterns are checked in a fixed order and the first match wins, so
/// compiler errors take precedence over assertion failures.
pub struct RootCauseClassifier {
    test_patterns: Vec<(RootCause, Regex)>,
}

impl RootCauseClassifier {
    pub fn new() -> Result<Self, regex::Error> {
        let test_patterns = vec![
            (
                RootCause::SyntaxError,
                Regex::new(
                    r"(?i)(syntax ?error|expected one of|unexpected (token|eof|indent)|unterminated|unclosed delimiter|IndentationError|mismatched closing delimiter)",
                )?,
            ),
            (
                RootCause::MissingImport,
                Regex::new(
                    r"(?i)(unresolved import|cannot find (type|function|value|macro|trait|struct|module|crate|derive macro)|use of undeclared|not found in this scope|ModuleNotFoundError|ImportError|no module named|cannot find module)",
                )?,
            ),
            (
                RootCause::WrongFilePath,
                Regex::new(
                    r"(?i)(no such file or directory|file not found|FileNotFoundError|ENOENT|couldn't read|escapes the workspace|path .* does not exist)",
                )?,
            ),
            (
                RootCause::AssertionMismatch,
                Regex::new(
                    r"(?i)(assertion[^\n]*failed|left\s*==\s*right|AssertionError|expected[^\n]*(but )?(got|was|found)|assert_eq!)",
                )?,
            ),
            (
                RootCause::FlakyAssumption,
                Regex::new(
                    r"(?i)(timed out|flaky|race condition|intermittent|connection refused|address already in use|deadlock|nondeterministic)",
                )?,
            ),
        ];
        Ok(Self { test_patterns })
    }

    pub fn classify(&self, evidence: &FailureEvidence) -> RootCause {
        match evidence {
            FailureEvidence::Tests { .. } => self.classify_text(&evidence.text()),
            FailureEvidence::Review { .. } => RootCause::ArchitectureViolation,
            FailureEvidence::Degenerate { .. } => RootCause::DegenerateLoop,
            FailureEvidence::Worker { reason } => match reason {
                WorkerFailureReason::Reported { .. }
                | WorkerFailureReason::MissingPatch
                | WorkerFailureReason::SessionLost { .. } => RootCause::WorkerCrash,
                WorkerFailureReason::Blocked { .. } => RootCause::Blocked,
                WorkerFailureReason::Timeout { .. } => RootCause::Timeout,
                WorkerFailureReason::Cancelled => RootCause::Cancelled,
            },
        }
    }

    pub fn classify_text(&self, text: &str) -> RootCause {
        self.test_patterns
            .iter()
            .find(|(_, pattern)| pattern.is_match(text))
            .map_or(RootCause::Unknown, |(cause, _)| *cause)
    }
}
