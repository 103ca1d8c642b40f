//! Engineering state owned by a single micro-loop instance.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

use super::feedback::FailureRecord;
use super::health::SemanticHealthMetric;
use super::session::{CandidatePatch, WorkerSession};
use super::ticket::{Ticket, TicketId, TicketStatus};
use super::verification::TechDebtTag;

/// Terminal status returned upward from `run_task`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Done,
    Failed,
}

impl RunStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a ticket was handed back without success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    RetriesExhausted,
    Cancelled,
}

impl EscalationReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RetriesExhausted => "retries_exhausted",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Final result of a ticket's micro-loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub ticket_id: TicketId,
    pub status: RunStatus,
    pub final_patch: Option<CandidatePatch>,
    pub tech_debt_tag: Option<TechDebtTag>,
    pub escalation: Option<EscalationReason>,
    pub failure_history: Vec<FailureRecord>,
    pub dispatch_count: u32,
    pub retries_used: u32,
    pub architect_refactor_attempts: u32,
    pub last_health: Option<SemanticHealthMetric>,
    pub finished_at: DateTime<Utc>,
}

impl TaskOutcome {
    pub fn is_done(&self) -> bool {
        self.status == RunStatus::Done
    }
}

/// Mutable state of one ticket's loop.
///
/// Holds at most one session at a time, never lets `retries_used` decrease, and
/// accepts a terminal outcome exactly once.
#[derive(Debug, Clone)]
pub struct EngineeringState {
    ticket: Ticket,
    session: Option<WorkerSession>,
    retries_used: u32,
    dispatch_count: u32,
    failure_history: Vec<FailureRecord>,
    outcome: Option<TaskOutcome>,
}

impl EngineeringState {
    pub const fn new(ticket: Ticket) -> Self {
        Self {
            ticket,
            session: None,
            retries_used: 0,
            dispatch_count: 0,
            failure_history: Vec::new(),
            outcome: None,
        }
    }

    pub const fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    pub const fn session(&self) -> Option<&WorkerSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut WorkerSession> {
        self.session.as_mut()
    }

    /// Borrow the ticket and the active session together.
    pub fn ticket_and_session_mut(&mut self) -> Option<(&Ticket, &mut WorkerSession)> {
        let ticket = &self.ticket;
        self.session.as_mut().map(|session| (ticket, session))
    }

    pub const fn retries_used(&self) -> u32 {
        self.retries_used
    }

    pub const fn dispatch_count(&self) -> u32 {
        self.dispatch_count
    }

    pub fn failure_history(&self) -> &[FailureRecord] {
        &self.failure_history
    }

    pub const fn outcome(&self) -> Option<&TaskOutcome> {
        self.outcome.as_ref()
    }

    pub const fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Mark the ticket in progress and install a fresh session, discarding the old one.
    pub fn begin_session(&mut self, session: WorkerSession) -> DomainResult<()> {
        self.ensure_open()?;
        self.ticket.transition_to(TicketStatus::InProgress)?;
        self.dispatch_count += 1;
        self.session = Some(session);
        Ok(())
    }

    /// Add to the retry counter; the counter only grows.
    pub fn charge_retries(&mut self, cost: u32) {
        self.retries_used = self.retries_used.saturating_add(cost);
    }

    pub fn record_failure(&mut self, record: FailureRecord) {
        self.failure_history.push(record);
    }

    /// Terminal success.
    pub fn complete(
        &mut self,
        final_patch: CandidatePatch,
        tech_debt_tag: Option<TechDebtTag>,
    ) -> DomainResult<TaskOutcome> {
        self.finish(TicketStatus::Done, Some(final_patch), tech_debt_tag, None)
    }

    /// Terminal failure, escalated with the full failure history.
    pub fn fail(&mut self, reason: EscalationReason) -> DomainResult<TaskOutcome> {
        self.finish(TicketStatus::Failed, None, None, Some(reason))
    }

    fn finish(
        &mut self,
        status: TicketStatus,
        final_patch: Option<CandidatePatch>,
        tech_debt_tag: Option<TechDebtTag>,
        escalation: Option<EscalationReason>,
    ) -> DomainResult<TaskOutcome> {
        self.ensure_open()?;
        self.ticket.transition_to(status)?;

        let session = self.session.take();
        let outcome = TaskOutcome {
            ticket_id: self.ticket.id.clone(),
            status: if status == TicketStatus::Done {
                RunStatus::Done
            } else {
                RunStatus::Failed
            },
            final_patch,
            tech_debt_tag,
            escalation,
            failure_history: self.failure_history.clone(),
            dispatch_count: self.dispatch_count,
            retries_used: self.retries_used,
            architect_refactor_attempts: session
                .as_ref()
                .map_or(0, |s| s.architect_refactor_attempts),
            last_health: session.and_then(|s| s.health),
            finished_at: Utc::now(),
        };
        self.outcome = Some(outcome.clone());
        Ok(outcome)
    }

    fn ensure_open(&self) -> DomainResult<()> {
        if self.outcome.is_some() {
            return Err(DomainError::InvalidStateTransition {
                from: self.ticket.status.as_str().to_string(),
                to: "any".to_string(),
                reason: format!("ticket {} already reached a terminal state", self.ticket.id),
            });
        }
        Ok(())
    }
}
