//! Task dispatch: turns a ready ticket into a fresh worker session.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::errors::{Collaborator, LoopError};
use crate::domain::models::{
    EngineeringState, LoopPolicyConfig, SessionId, Ticket, TicketStatus, WorkerSession,
};
use crate::domain::ports::{Backlog, ContextProvider, Worker};

/// Opens worker sessions for tickets.
pub struct TaskDispatcher {
    worker: Arc<dyn Worker>,
    context: Arc<dyn ContextProvider>,
    backlog: Arc<dyn Backlog>,
    base_constraints: Vec<String>,
    retry_constraints: Vec<String>,
}

impl TaskDispatcher {
    pub fn new(
        worker: Arc<dyn Worker>,
        context: Arc<dyn ContextProvider>,
        backlog: Arc<dyn Backlog>,
        policy: &LoopPolicyConfig,
    ) -> Self {
        Self {
            worker,
            context,
            backlog,
            base_constraints: policy.base_constraints.clone(),
            retry_constraints: policy.retry_constraints.clone(),
        }
    }

    /// Reject the ticket unless every dependency is `Done` in the backlog.
    pub async fn ensure_ready(&self, ticket: &Ticket) -> Result<(), LoopError> {
        let mut unmet = Vec::new();
        for dependency in &ticket.dependencies {
            let status = self
                .backlog
                .status_of(dependency)
                .await
                .map_err(LoopError::infra(Collaborator::Backlog))?;
            if status != Some(TicketStatus::Done) {
                debug!(
                    ticket_id = %ticket.id,
                    dependency = %dependency,
                    status = ?status,
                    "dependency not done"
                );
                unmet.push(dependency.clone());
            }
        }

        if unmet.is_empty() {
            Ok(())
        } else {
            Err(LoopError::TicketNotReady {
                ticket: ticket.id.clone(),
                unmet,
            })
        }
    }

    /// Open a new session for the ticket, replacing any prior one.
    ///
    /// `instructions` is empty on the first attempt. `inherited_architect_attempts`
    /// carries the refactor counter across architect-driven re-dispatches.
    pub async fn dispatch(
        &self,
        state: &mut EngineeringState,
        instructions: &[String],
        inherited_architect_attempts: u32,
    ) -> Result<SessionId, LoopError> {
        let ticket = state.ticket();
        let mut slice = self
            .context
            .slice_for(ticket)
            .await
            .map_err(LoopError::infra(Collaborator::ContextProvider))?;

        if instructions.is_empty() {
            slice.add_constraints(self.base_constraints.iter().cloned());
        } else {
            slice.add_constraints(self.retry_constraints.iter().cloned());
            slice.merge_instructions(instructions);
        }

        let session_id = self
            .worker
            .open_session(ticket, &slice)
            .await
            .map_err(LoopError::infra(Collaborator::Worker))?;

        let attempt = state.dispatch_count() + 1;
        state.begin_session(WorkerSession::new(
            session_id.clone(),
            attempt,
            inherited_architect_attempts,
        ))?;

        self.backlog
            .record_status(&state.ticket().id, TicketStatus::InProgress)
            .await
            .map_err(LoopError::infra(Collaborator::Backlog))?;

        info!(
            ticket_id = %state.ticket().id,
            session_id = %session_id,
            attempt,
            worker = self.worker.name(),
            files = slice.files.len(),
            constraints = slice.constraints.len(),
            corrective_instructions = slice.corrective_instructions.len(),
            "dispatched ticket"
        );

        Ok(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::backlog::InMemoryBacklog;
    use crate::adapters::context::StaticContextProvider;
    use crate::adapters::worker::{ScriptStep, ScriptedWorker};
    use crate::domain::models::{PollReport, TicketId, WorkerStatus};

    fn dispatcher(worker: Arc<ScriptedWorker>, backlog: Arc<InMemoryBacklog>) -> TaskDispatcher {
        TaskDispatcher::new(
            worker,
            Arc::new(StaticContextProvider::default()),
            backlog,
            &LoopPolicyConfig::default(),
        )
    }

    fn worker() -> Arc<ScriptedWorker> {
        Arc::new(ScriptedWorker::new(vec![vec![ScriptStep::Report(
            PollReport::status(WorkerStatus::Working),
        )]]))
    }

    #[tokio::test]
    async fn test_unmet_dependencies_are_rejected() {
        let backlog = Arc::new(InMemoryBacklog::new());
        backlog.set_status(TicketId::new("T-1"), TicketStatus::Done).await;
        backlog.set_status(TicketId::new("T-2"), TicketStatus::InProgress).await;

        let ticket = Ticket::new("T-3", "t", "d").with_dependencies(vec![
            TicketId::new("T-1"),
            TicketId::new("T-2"),
            TicketId::new("T-9"),
        ]);

        let err = dispatcher(worker(), backlog)
            .ensure_ready(&ticket)
            .await
            .unwrap_err();
        match err {
            LoopError::TicketNotReady { unmet, .. } => {
                assert_eq!(unmet, vec![TicketId::new("T-2"), TicketId::new("T-9")]);
            }
            other => panic!("expected TicketNotReady, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_first_dispatch_carries_base_constraints() {
        let worker = worker();
        let backlog = Arc::new(InMemoryBacklog::new());
        let dispatcher = dispatcher(worker.clone(), backlog.clone());
        let mut state = EngineeringState::new(Ticket::new("T-1", "t", "d"));

        dispatcher.dispatch(&mut state, &[], 0).await.unwrap();

        let contexts = worker.opened_contexts().await;
        assert_eq!(contexts.len(), 1);
        assert!(!contexts[0].is_retry());
        assert_eq!(contexts[0].constraints, LoopPolicyConfig::default().base_constraints);
        assert_eq!(state.dispatch_count(), 1);
        assert_eq!(state.session().unwrap().attempt, 1);
        assert_eq!(
            backlog.status_of(&TicketId::new("T-1")).await.unwrap(),
            Some(TicketStatus::InProgress)
        );
    }

    #[tokio::test]
    async fn test_retry_dispatch_merges_instructions_and_inherits_counter() {
        let worker = worker();
        let dispatcher = dispatcher(worker.clone(), Arc::new(InMemoryBacklog::new()));
        let mut state = EngineeringState::new(Ticket::new("T-1", "t", "d"));

        dispatcher.dispatch(&mut state, &[], 0).await.unwrap();
        let instructions = vec!["Fix the import of `Parser`".to_string()];
        dispatcher.dispatch(&mut state, &instructions, 1).await.unwrap();

        let contexts = worker.opened_contexts().await;
        assert!(contexts[1].is_retry());
        assert_eq!(contexts[1].corrective_instructions, instructions);
        assert_eq!(state.session().unwrap().architect_refactor_attempts, 1);
        assert_eq!(state.session().unwrap().attempt, 2);
    }

    #[tokio::test]
    async fn test_unreachable_worker_is_infrastructure_fault() {
        let worker = Arc::new(ScriptedWorker::unreachable());
        let dispatcher = dispatcher(worker, Arc::new(InMemoryBacklog::new()));
        let mut state = EngineeringState::new(Ticket::new("T-1", "t", "d"));

        let err = dispatcher.dispatch(&mut state, &[], 0).await.unwrap_err();
        assert!(matches!(
            err,
            LoopError::Infrastructure {
                collaborator: Collaborator::Worker,
                ..
            }
        ));
        assert_eq!(state.dispatch_count(), 0);
    }
}
