//! Human interrupt that raises a warning in the log stream.

use async_trait::async_trait;
use tracing::warn;

use crate::domain::errors::PortResult;
use crate::domain::models::{SessionId, Ticket};
use crate::domain::ports::HumanInterrupt;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInterrupt;

impl TracingInterrupt {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HumanInterrupt for TracingInterrupt {
    async fn request_help(
        &self,
        ticket: &Ticket,
        session_id: &SessionId,
        message: Option<&str>,
    ) -> PortResult<()> {
        warn!(
            ticket_id = %ticket.id,
            session_id = %session_id,
            message = message.unwrap_or("no message"),
            "Worker is blocked and needs human input"
        );
        Ok(())
    }
}
