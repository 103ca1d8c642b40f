//! Architect gate and the Stability Protocol.
//!
//! | refactor attempts | verdict  | action                                         |
//! |-------------------|----------|------------------------------------------------|
//! | 0                 | approval | accept                                         |
//! | 0                 | rejected | attempts = 1, session failed, feedback          |
//! | ≥ 1               | approval | accept                                         |
//! | ≥ 1               | rejected | fallback: accept with a tech-debt tag (WARN)   |
//!
//! The second architectural rejection in a chain always terminates the loop.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::errors::{Collaborator, LoopError};
use crate::domain::models::{
    CandidatePatch, ReviewVerdict, RuleSet, Ticket, Violation, WorkerSession,
    WorkerStatus,
};
use crate::domain::ports::Reviewer;

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Terminal success. `fallback` is set when the Stability Protocol forced it.
    Accepted { verdict: ReviewVerdict, fallback: bool },
    /// First rejection in the chain; the violations go back to the worker
    Rejected { violations: Vec<Violation> },
}

pub struct ArchitectGate {
    reviewer: Arc<dyn Reviewer>,
    rules: Arc<RuleSet>,
}

impl ArchitectGate {
    pub fn new(reviewer: Arc<dyn Reviewer>, rules: Arc<RuleSet>) -> Self {
        Self { reviewer, rules }
    }

    /// Review the full resulting source of a patch that already passed QA.
    pub async fn review(
        &self,
        ticket: &Ticket,
        session: &mut WorkerSession,
        patch: &CandidatePatch,
    ) -> Result<GateDecision, LoopError> {
        let verdict = self
            .reviewer
            .review(&patch.files, &self.rules, ticket)
            .await
            .map_err(LoopError::infra(Collaborator::Reviewer))?
            .normalized();

        info!(
            ticket_id = %ticket.id,
            attempt = session.attempt,
            reviewer = self.reviewer.name(),
            rules_digest = %self.rules.digest(),
            status = verdict.status.as_str(),
            violations = verdict.violations.len(),
            quality_score = ?verdict.quality_score,
            "architect review finished"
        );

        Ok(apply_stability_protocol(session, verdict))
    }
}

/// Apply the Stability Protocol to a reviewer verdict.
pub fn apply_stability_protocol(session: &mut WorkerSession, verdict: ReviewVerdict) -> GateDecision {
    if verdict.status.is_approval() {
        session.status = WorkerStatus::Completed;
        return GateDecision::Accepted {
            verdict,
            fallback: false,
        };
    }

    if session.architect_refactor_attempts == 0 {
        session.architect_refactor_attempts = 1;
        session.status = WorkerStatus::Failed;
        return GateDecision::Rejected {
            violations: verdict.violations,
        };
    }

    warn!(
        session_id = %session.session_id,
        attempt = session.attempt,
        violations = verdict.violations.len(),
        "stability fallback: accepting rejected patch as tech debt"
    );
    session.status = WorkerStatus::Completed;
    let forced = ReviewVerdict {
        quality_score: verdict.quality_score,
        ..ReviewVerdict::approved_with_tech_debt(verdict.violations)
    };
    GateDecision::Accepted {
        verdict: forced,
        fallback: true,
    }
}
