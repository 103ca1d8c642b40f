use async_trait::async_trait;

use crate::domain::errors::PortResult;
use crate::domain::models::{SessionId, Ticket};

/// Channel for asking a human to unblock a worker.
#[async_trait]
pub trait HumanInterrupt: Send + Sync {
    async fn request_help(
        &self,
        ticket: &Ticket,
        session_id: &SessionId,
        message: Option<&str>,
    ) -> PortResult<()>;
}
