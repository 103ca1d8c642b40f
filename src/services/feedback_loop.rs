//! Feedback loop: turns a failed attempt into corrective instructions and
//! decides between retry and escalation.
//!
//! Every failure is recorded in the ticket's history. A tunneling failure costs
//! `tunneling_retry_cost` (default 2) against the retry ceiling, every other
//! failure costs 1. A cancelled attempt is recorded but never retried.

use tracing::{info, warn};

use crate::domain::models::{
    EngineeringState, EscalationReason, FailureEvidence, FailureKind, FailureRecord,
    LoopPolicyConfig, RootCause,
};
use crate::infrastructure::logging::SecretScrubber;

use super::root_cause::RootCauseClassifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackDecision {
    /// Re-dispatch with these instructions merged into the context slice
    Retry {
        instructions: Vec<String>,
        inherited_architect_attempts: u32,
    },
    Escalate(EscalationReason),
}

pub struct FeedbackLoop {
    classifier: RootCauseClassifier,
    scrubber: SecretScrubber,
    retry_ceiling: u32,
    tunneling_retry_cost: u32,
    excerpt_chars: usize,
}

impl FeedbackLoop {
    pub fn new(policy: &LoopPolicyConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            classifier: RootCauseClassifier::new()?,
            scrubber: SecretScrubber::new()?,
            retry_ceiling: policy.retry_ceiling,
            tunneling_retry_cost: policy.tunneling_retry_cost,
            excerpt_chars: policy.evidence_excerpt_chars,
        })
    }

    pub const fn retry_cost(&self, kind: FailureKind) -> u32 {
        match kind {
            FailureKind::Tunneling => self.tunneling_retry_cost,
            FailureKind::TestFailure | FailureKind::ArchitectRejection | FailureKind::WorkerFailed => 1,
        }
    }

    /// Record the failure and decide what happens next.
    pub fn process(&self, state: &mut EngineeringState, evidence: FailureEvidence) -> FeedbackDecision {
        let kind = evidence.kind();
        let root_cause = self.classifier.classify(&evidence);
        let (attempt, architect_attempts) = state.session().map_or(
            (state.dispatch_count(), 0),
            |s| (s.attempt, s.architect_refactor_attempts),
        );
        let instructions = self.build_instructions(attempt, root_cause, &evidence);
        let cancelled = evidence.is_cancellation();

        state.record_failure(FailureRecord::new(
            attempt,
            root_cause,
            evidence,
            instructions.clone(),
        ));

        if cancelled {
            warn!(ticket_id = %state.ticket().id, attempt, "attempt cancelled, escalating");
            return FeedbackDecision::Escalate(EscalationReason::Cancelled);
        }

        let cost = self.retry_cost(kind);
        let projected = state.retries_used().saturating_add(cost);
        if projected > self.retry_ceiling {
            warn!(
                ticket_id = %state.ticket().id,
                attempt,
                kind = kind.as_str(),
                root_cause = root_cause.as_str(),
                retries_used = state.retries_used(),
                cost,
                retry_ceiling = self.retry_ceiling,
                "retry ceiling reached, escalating"
            );
            return FeedbackDecision::Escalate(EscalationReason::RetriesExhausted);
        }

        state.charge_retries(cost);
        info!(
            ticket_id = %state.ticket().id,
            attempt,
            kind = kind.as_str(),
            root_cause = root_cause.as_str(),
            retries_used = state.retries_used(),
            retry_ceiling = self.retry_ceiling,
            "scheduling retry"
        );

        FeedbackDecision::Retry {
            instructions,
            inherited_architect_attempts: if kind == FailureKind::ArchitectRejection {
                architect_attempts
            } else {
                0
            },
        }
    }

    fn build_instructions(
        &self,
        attempt: u32,
        root_cause: RootCause,
        evidence: &FailureEvidence,
    ) -> Vec<String> {
        let mut instructions = vec![
            format!(
                "Attempt {attempt} failed ({}, root cause: {}).",
                evidence.kind().as_str(),
                root_cause.as_str()
            ),
            guidance(root_cause).to_string(),
        ];

        match evidence {
            FailureEvidence::Tests { outcome } if !outcome.evidence.failing_tests.is_empty() => {
                instructions.push(format!(
                    "Failing tests: {}",
                    outcome.evidence.failing_tests.join(", ")
                ));
            }
            FailureEvidence::Review { violations } => {
                for violation in violations {
                    let mut line = format!("Violation: {}", violation.summary());
                    if let Some(remedy) = &violation.suggested_remedy {
                        line.push_str(&format!(" Remedy: {remedy}"));
                    }
                    instructions.push(line);
                }
            }
            _ => {}
        }

        let excerpt = tail_chars(&self.scrubber.scrub_message(&evidence.text()), self.excerpt_chars);
        if !excerpt.trim().is_empty() {
            instructions.push(format!("Evidence:\n{excerpt}"));
        }
        instructions
    }
}

fn guidance(root_cause: RootCause) -> &'static str {
    match root_cause {
        RootCause::MissingImport => {
            "A symbol or module could not be resolved. Add the missing import or dependency and check the module path."
        }
        RootCause::WrongFilePath => {
            "A file path is wrong. Verify the paths you read and write exist inside the workspace."
        }
        RootCause::SyntaxError => {
            "The code does not parse. Fix the syntax error before changing any behaviour."
        }
        RootCause::AssertionMismatch => {
            "A test assertion failed. Compare the expected and actual values and fix the logic, not the test."
        }
        RootCause::FlakyAssumption => {
            "The failure depends on timing or environment. Remove assumptions about ordering, ports and wall-clock time."
        }
        RootCause::ArchitectureViolation => {
            "The architect rejected the change. Refactor to resolve every listed violation while keeping the tests green."
        }
        RootCause::DegenerateLoop => {
            "STOP. Your last steps repeated the same action without progress. Take a fundamentally different approach."
        }
        RootCause::WorkerCrash => {
            "The previous session ended without a usable patch. Produce a complete patch this time."
        }
        RootCause::Timeout => {
            "The previous attempt ran out of time. Make a smaller, focused change."
        }
        RootCause::Blocked => {
            "The previous attempt was blocked waiting for input. Proceed with the most reasonable assumption and state it."
        }
        RootCause::Cancelled => "The previous attempt was cancelled.",
        RootCause::Unknown => {
            "The tests failed for an unclassified reason. Read the evidence carefully before editing."
        }
    }
}

/// Keep the last `max` characters of `text`.
fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    text.chars().skip(count - max).collect()
}
