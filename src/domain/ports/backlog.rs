use async_trait::async_trait;

use crate::domain::errors::PortResult;
use crate::domain::models::{TicketId, TicketStatus};

/// The shared backlog: the only collaborator concurrent loops have in common.
#[async_trait]
pub trait Backlog: Send + Sync {
    /// Current status of a ticket, `None` when the backlog does not know it.
    async fn status_of(&self, id: &TicketId) -> PortResult<Option<TicketStatus>>;

    /// Append a status change for a ticket.
    async fn record_status(&self, id: &TicketId, status: TicketStatus) -> PortResult<()>;
}
