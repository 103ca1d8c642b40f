//! TaskRunner - drives one ticket through the micro-loop
//!
//! ```text
//! Dispatch ──► Watch ──► Guard ──► Verify ──► Review ──► Terminal (Done)
//!                │         │         │          │
//!                └─────────┴─────────┴──────────┴──► Feedback ──► Dispatch
//!                                                        └──────► Terminal (Failed)
//! ```
//!
//! Each invocation owns its [`EngineeringState`]; concurrent tickets share
//! nothing but the backlog. Task faults are absorbed by the feedback loop and
//! only infrastructure faults escape as errors.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::domain::errors::{Collaborator, DomainError, DomainResult, LoopError};
use crate::domain::models::{
    CandidatePatch, Config, EngineeringState, FailureEvidence, FailureKind, ReviewVerdict,
    RuleSet, TaskOutcome, Ticket, TicketStatus,
};
use crate::domain::ports::{
    Backlog, ContextProvider, HumanInterrupt, Reviewer, TestRunner, TrajectoryEmbedder, Worker,
};
use crate::infrastructure::logging::{LoopEvent, LoopEventKind, TransitionJournal};
use crate::services::{
    ArchitectGate, CancelSignal, EntropyGuard, FeedbackDecision, FeedbackLoop, GateDecision,
    HealthAssessment, HealthScorerConfig, QaVerdict, QaVerifier, SemanticHealthScorer,
    TaskDispatcher, WatchTower, WatchVerdict,
};

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Stage of the micro-loop state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopStage {
    Dispatch,
    Watch,
    Guard,
    Verify,
    Review,
    Feedback,
    Terminal,
}

impl LoopStage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::Watch => "watch",
            Self::Guard => "guard",
            Self::Verify => "verify",
            Self::Review => "review",
            Self::Feedback => "feedback",
            Self::Terminal => "terminal",
        }
    }

    pub fn valid_transitions(&self) -> Vec<Self> {
        match self {
            Self::Dispatch => vec![Self::Watch],
            Self::Watch => vec![Self::Guard, Self::Feedback],
            Self::Guard => vec![Self::Verify, Self::Feedback],
            Self::Verify => vec![Self::Review, Self::Feedback],
            Self::Review => vec![Self::Terminal, Self::Feedback],
            Self::Feedback => vec![Self::Dispatch, Self::Terminal],
            Self::Terminal => vec![],
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

struct StageTracker {
    current: LoopStage,
}

impl StageTracker {
    const fn new() -> Self {
        Self {
            current: LoopStage::Dispatch,
        }
    }

    fn enter(&mut self, next: LoopStage) -> DomainResult<()> {
        if !self.current.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.current.as_str().to_string(),
                to: next.as_str().to_string(),
                reason: "not a micro-loop transition".to_string(),
            });
        }
        debug!(from = self.current.as_str(), to = next.as_str(), "stage transition");
        self.current = next;
        Ok(())
    }
}

enum AttemptResult {
    Accepted {
        patch: CandidatePatch,
        verdict: ReviewVerdict,
        fallback: bool,
    },
    Failed(FailureEvidence),
}

// ---------------------------------------------------------------------------
// TaskRunner
// ---------------------------------------------------------------------------

/// Everything the loop talks to.
#[derive(Clone)]
pub struct LoopCollaborators {
    pub worker: Arc<dyn Worker>,
    pub test_runner: Arc<dyn TestRunner>,
    pub reviewer: Arc<dyn Reviewer>,
    pub embedder: Arc<dyn TrajectoryEmbedder>,
    pub backlog: Arc<dyn Backlog>,
    pub context: Arc<dyn ContextProvider>,
    /// Used only when `escalation.human_interrupt` is enabled
    pub interrupt: Option<Arc<dyn HumanInterrupt>>,
    pub rules: Arc<RuleSet>,
}

pub struct TaskRunner {
    dispatcher: TaskDispatcher,
    watch_tower: WatchTower,
    guard: EntropyGuard,
    qa: QaVerifier,
    gate: ArchitectGate,
    feedback: FeedbackLoop,
    backlog: Arc<dyn Backlog>,
    journal: Option<TransitionJournal>,
}

impl TaskRunner {
    pub fn new(collaborators: LoopCollaborators, config: &Config) -> DomainResult<Self> {
        let policy = &config.loop_policy;
        let interrupt = if config.escalation.human_interrupt {
            collaborators.interrupt
        } else {
            None
        };

        let feedback = FeedbackLoop::new(policy).map_err(|e| {
            DomainError::ValidationFailed(format!("invalid feedback pattern: {e}"))
        })?;

        Ok(Self {
            dispatcher: TaskDispatcher::new(
                collaborators.worker.clone(),
                collaborators.context,
                collaborators.backlog.clone(),
                policy,
            ),
            watch_tower: WatchTower::new(
                collaborators.worker,
                interrupt,
                config.polling.clone(),
                policy.interrupt_on_poll,
            ),
            guard: EntropyGuard::new(SemanticHealthScorer::new(
                collaborators.embedder,
                HealthScorerConfig::from(policy),
            )),
            qa: QaVerifier::new(collaborators.test_runner),
            gate: ArchitectGate::new(collaborators.reviewer, collaborators.rules),
            feedback,
            backlog: collaborators.backlog,
            journal: None,
        })
    }

    #[must_use]
    pub fn with_journal(mut self, journal: TransitionJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Run a ticket to a terminal outcome.
    ///
    /// Returns `Ok` for both `Done` and `Failed`; `Err` means the ticket was not
    /// ready, a collaborator was unavailable, or a state invariant was broken.
    pub async fn run_task(
        &self,
        ticket: Ticket,
        mut cancel: CancelSignal,
    ) -> Result<TaskOutcome, LoopError> {
        let span = info_span!("run_task", ticket_id = %ticket.id);
        async move {
            self.dispatcher.ensure_ready(&ticket).await?;
            info!(title = %ticket.title, "starting micro-loop");

            let mut state = EngineeringState::new(ticket);
            let mut stages = StageTracker::new();
            let mut instructions: Vec<String> = Vec::new();
            let mut inherited_architect_attempts = 0;

            loop {
                self.dispatcher
                    .dispatch(&mut state, &instructions, inherited_architect_attempts)
                    .await?;
                let attempt = state.dispatch_count();
                self.journal(
                    LoopEvent::new(state.ticket().id.clone(), attempt, LoopEventKind::Dispatched)
                        .with_detail(json!({
                            "corrective_instructions": instructions.len(),
                            "architect_refactor_attempts": inherited_architect_attempts,
                        })),
                );

                let evidence = match self.attempt(&mut state, &mut stages, &mut cancel).await? {
                    AttemptResult::Accepted {
                        patch,
                        verdict,
                        fallback,
                    } => {
                        stages.enter(LoopStage::Terminal)?;
                        if fallback {
                            self.journal(
                                LoopEvent::new(
                                    state.ticket().id.clone(),
                                    attempt,
                                    LoopEventKind::StabilityFallback,
                                )
                                .with_detail(json!({ "violations": verdict.violations.len() })),
                            );
                        }
                        let outcome = state.complete(patch, verdict.tech_debt_tag)?;
                        self.record_backlog(&outcome, TicketStatus::Done).await?;
                        info!(
                            attempt,
                            retries_used = outcome.retries_used,
                            tech_debt = outcome.tech_debt_tag.is_some(),
                            "ticket done"
                        );
                        self.journal(
                            LoopEvent::new(outcome.ticket_id.clone(), attempt, LoopEventKind::Completed)
                                .with_detail(json!({
                                    "tech_debt": outcome.tech_debt_tag.as_ref().map(|t| &t.note),
                                })),
                        );
                        return Ok(outcome);
                    }
                    AttemptResult::Failed(evidence) => evidence,
                };

                stages.enter(LoopStage::Feedback)?;
                self.journal(failure_event(&state, attempt, &evidence));

                match self.feedback.process(&mut state, evidence) {
                    FeedbackDecision::Retry {
                        instructions: next,
                        inherited_architect_attempts: inherited,
                    } => {
                        stages.enter(LoopStage::Dispatch)?;
                        self.journal(
                            LoopEvent::new(state.ticket().id.clone(), attempt, LoopEventKind::RetryScheduled)
                                .with_detail(json!({
                                    "retries_used": state.retries_used(),
                                    "instructions": next.len(),
                                })),
                        );
                        instructions = next;
                        inherited_architect_attempts = inherited;
                    }
                    FeedbackDecision::Escalate(reason) => {
                        stages.enter(LoopStage::Terminal)?;
                        let outcome = state.fail(reason)?;
                        self.record_backlog(&outcome, TicketStatus::Failed).await?;
                        warn!(
                            attempt,
                            retries_used = outcome.retries_used,
                            failures = outcome.failure_history.len(),
                            escalation = ?reason,
                            "ticket failed, escalating"
                        );
                        self.journal(
                            LoopEvent::new(outcome.ticket_id.clone(), attempt, LoopEventKind::Escalated)
                                .with_detail(json!({
                                    "reason": reason,
                                    "failures": outcome.failure_history.len(),
                                })),
                        );
                        return Ok(outcome);
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Watch, guard, verify and review the current session.
    async fn attempt(
        &self,
        state: &mut EngineeringState,
        stages: &mut StageTracker,
        cancel: &mut CancelSignal,
    ) -> Result<AttemptResult, LoopError> {
        let (ticket, session) = state
            .ticket_and_session_mut()
            .ok_or_else(|| DomainError::ValidationFailed("no active worker session".to_string()))?;

        stages.enter(LoopStage::Watch)?;
        let patch = match self
            .watch_tower
            .watch(ticket, session, &self.guard, cancel)
            .await?
        {
            WatchVerdict::Ready(patch) => patch,
            WatchVerdict::Tunneling(metric) => {
                return Ok(AttemptResult::Failed(FailureEvidence::Degenerate { metric }));
            }
            WatchVerdict::WorkerFailed(reason) => {
                return Ok(AttemptResult::Failed(FailureEvidence::Worker { reason }));
            }
        };

        stages.enter(LoopStage::Guard)?;
        if let HealthAssessment::Tunneling(metric) = self.guard.assess(session).await? {
            return Ok(AttemptResult::Failed(FailureEvidence::Degenerate { metric }));
        }

        stages.enter(LoopStage::Verify)?;
        if let QaVerdict::Failed(outcome) = self.qa.verify(session, &patch).await? {
            return Ok(AttemptResult::Failed(FailureEvidence::Tests { outcome }));
        }

        stages.enter(LoopStage::Review)?;
        match self.gate.review(ticket, session, &patch).await? {
            GateDecision::Accepted { verdict, fallback } => Ok(AttemptResult::Accepted {
                patch,
                verdict,
                fallback,
            }),
            GateDecision::Rejected { violations } => {
                Ok(AttemptResult::Failed(FailureEvidence::Review { violations }))
            }
        }
    }

    async fn record_backlog(&self, outcome: &TaskOutcome, status: TicketStatus) -> Result<(), LoopError> {
        self.backlog
            .record_status(&outcome.ticket_id, status)
            .await
            .map_err(LoopError::infra(Collaborator::Backlog))
    }

    fn journal(&self, event: LoopEvent) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.record(&event) {
                warn!(error = %e, kind = ?event.kind, "failed to journal loop event");
            }
        }
    }
}

fn failure_event(state: &EngineeringState, attempt: u32, evidence: &FailureEvidence) -> LoopEvent {
    let detail = match evidence {
        FailureEvidence::Tests { outcome } => json!({
            "failing_tests": outcome.evidence.failing_tests,
            "failed_count": outcome.evidence.failed_count,
            "patch_digest": outcome.patch_digest,
        }),
        FailureEvidence::Review { violations } => json!({
            "violations": violations.iter().map(|v| v.rule_id.as_str()).collect::<Vec<_>>(),
        }),
        FailureEvidence::Degenerate { metric } => json!({
            "score": metric.score,
            "threshold": metric.threshold,
            "near_duplicate_pairs": metric.near_duplicate_pairs,
        }),
        FailureEvidence::Worker { reason } => json!({ "reason": reason }),
    };
    LoopEvent::new(state.ticket().id.clone(), attempt, evidence.kind().into()).with_detail(detail)
}

impl From<FailureKind> for LoopEventKind {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::TestFailure => Self::TestsFailed,
            FailureKind::ArchitectRejection => Self::ReviewRejected,
            FailureKind::Tunneling => Self::TunnelingDetected,
            FailureKind::WorkerFailed => Self::WorkerFailed,
        }
    }
}
