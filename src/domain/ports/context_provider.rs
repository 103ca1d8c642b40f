use async_trait::async_trait;

use crate::domain::errors::PortResult;
use crate::domain::models::{ContextSlice, Ticket};

/// Supplies the slice of project context sent with a dispatch.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn slice_for(&self, ticket: &Ticket) -> PortResult<ContextSlice>;
}
