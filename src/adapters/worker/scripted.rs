//! Scripted worker for tests and dry runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::{PortError, PortResult};
use crate::domain::models::{ContextSlice, PollReport, SessionId, Ticket, WorkerStatus};
use crate::domain::ports::Worker;

/// One scripted answer to `poll_status`.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Report(PollReport),
    Error(PortError),
}

#[derive(Debug)]
struct SessionScript {
    steps: Vec<ScriptStep>,
    cursor: usize,
}

impl SessionScript {
    /// Next step; the last step repeats forever.
    fn next_step(&mut self) -> ScriptStep {
        let Some(step) = self.steps.get(self.cursor).or_else(|| self.steps.last()) else {
            return ScriptStep::Report(PollReport::status(WorkerStatus::Working));
        };
        let step = step.clone();
        if self.cursor + 1 < self.steps.len() {
            self.cursor += 1;
        }
        step
    }
}

/// Deterministic in-memory worker.
///
/// The n-th opened session plays the n-th script; sessions past the end of the
/// list replay the last script.
pub struct ScriptedWorker {
    scripts: Vec<Vec<ScriptStep>>,
    sessions: Arc<RwLock<HashMap<SessionId, SessionScript>>>,
    opened: Arc<RwLock<Vec<ContextSlice>>>,
    cancelled: Arc<RwLock<Vec<SessionId>>>,
    offline: bool,
}

impl ScriptedWorker {
    pub fn new(scripts: Vec<Vec<ScriptStep>>) -> Self {
        Self {
            scripts,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            opened: Arc::new(RwLock::new(Vec::new())),
            cancelled: Arc::new(RwLock::new(Vec::new())),
            offline: false,
        }
    }

    /// A worker whose every call fails as unreachable.
    pub fn unreachable() -> Self {
        Self {
            offline: true,
            ..Self::new(Vec::new())
        }
    }

    /// Context slices sent with each `open_session`, in order.
    pub async fn opened_contexts(&self) -> Vec<ContextSlice> {
        self.opened.read().await.clone()
    }

    pub async fn cancelled_sessions(&self) -> Vec<SessionId> {
        self.cancelled.read().await.clone()
    }

    pub async fn session_count(&self) -> usize {
        self.opened.read().await.len()
    }

    fn check_online(&self) -> PortResult<()> {
        if self.offline {
            Err(PortError::unreachable("worker", "scripted worker is offline"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn open_session(&self, _ticket: &Ticket, context: &ContextSlice) -> PortResult<SessionId> {
        self.check_online()?;

        let mut opened = self.opened.write().await;
        let index = opened.len();
        opened.push(context.clone());

        let steps = self
            .scripts
            .get(index)
            .or_else(|| self.scripts.last())
            .cloned()
            .unwrap_or_default();
        let session_id = SessionId::new(format!("scripted-{}", index + 1));
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), SessionScript { steps, cursor: 0 });
        Ok(session_id)
    }

    async fn poll_status(&self, session_id: &SessionId) -> PortResult<PollReport> {
        self.check_online()?;

        let mut sessions = self.sessions.write().await;
        let script = sessions
            .get_mut(session_id)
            .ok_or_else(|| PortError::UnknownSession(session_id.to_string()))?;
        match script.next_step() {
            ScriptStep::Report(report) => Ok(report),
            ScriptStep::Error(err) => Err(err),
        }
    }

    async fn cancel_session(&self, session_id: &SessionId) -> PortResult<()> {
        self.check_online()?;
        self.cancelled.write().await.push(session_id.clone());
        Ok(())
    }
}
