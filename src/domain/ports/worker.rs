//! Worker port: the remote, non-deterministic code-generation agent.

use async_trait::async_trait;

use crate::domain::errors::PortResult;
use crate::domain::models::{ContextSlice, PollReport, SessionId, Ticket};

/// Remote code-generation worker.
///
/// Every call may fail with a [`PortError`](crate::domain::errors::PortError);
/// the loop treats such failures as infrastructure faults.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Worker name used in logs (e.g., "http", "scripted").
    fn name(&self) -> &'static str;

    /// Start a new session for the ticket with the given context.
    async fn open_session(&self, ticket: &Ticket, context: &ContextSlice) -> PortResult<SessionId>;

    /// Report the current status of a session.
    async fn poll_status(&self, session_id: &SessionId) -> PortResult<PollReport>;

    /// Ask the worker to stop a session. Best effort.
    async fn cancel_session(&self, session_id: &SessionId) -> PortResult<()>;
}
