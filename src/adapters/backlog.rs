//! In-memory backlog.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::PortResult;
use crate::domain::models::{TicketId, TicketStatus};
use crate::domain::ports::Backlog;

/// Backlog holding the full status history of every ticket it has seen.
///
/// Cloning shares the underlying store, so several loops can run against one
/// backlog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBacklog {
    history: Arc<RwLock<HashMap<TicketId, Vec<TicketStatus>>>>,
}

impl InMemoryBacklog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backlog pre-seeded with one status per ticket.
    pub fn with_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = (TicketId, TicketStatus)>,
    {
        let history = statuses
            .into_iter()
            .map(|(id, status)| (id, vec![status]))
            .collect();
        Self {
            history: Arc::new(RwLock::new(history)),
        }
    }

    pub async fn set_status(&self, id: TicketId, status: TicketStatus) {
        self.history.write().await.entry(id).or_default().push(status);
    }

    /// Every status recorded for a ticket, oldest first.
    pub async fn history(&self, id: &TicketId) -> Vec<TicketStatus> {
        self.history
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Backlog for InMemoryBacklog {
    async fn status_of(&self, id: &TicketId) -> PortResult<Option<TicketStatus>> {
        Ok(self
            .history
            .read()
            .await
            .get(id)
            .and_then(|h| h.last().copied()))
    }

    async fn record_status(&self, id: &TicketId, status: TicketStatus) -> PortResult<()> {
        self.set_status(id.clone(), status).await;
        Ok(())
    }
}
