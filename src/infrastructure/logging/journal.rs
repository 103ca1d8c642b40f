//! Transition journal for the micro-loop
//!
//! Appends one JSON line per loop event (dispatch, gate failure, fallback,
//! retry, escalation, completion) so a ticket's history can be replayed
//! after the process exits.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

use crate::domain::models::TicketId;

/// Journal writer shared by every loop instance in the process
#[derive(Clone)]
pub struct TransitionJournal {
    log_file: Arc<Mutex<File>>,
}

/// Loop event types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoopEventKind {
    Dispatched,
    TunnelingDetected,
    WorkerFailed,
    TestsFailed,
    ReviewRejected,
    StabilityFallback,
    RetryScheduled,
    Escalated,
    Completed,
}

/// Complete journal record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub ticket_id: TicketId,
    pub attempt: u32,
    pub kind: LoopEventKind,
    pub detail: Option<Value>,
}

impl LoopEvent {
    pub fn new(ticket_id: TicketId, attempt: u32, kind: LoopEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            ticket_id,
            attempt,
            kind,
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

impl TransitionJournal {
    /// Open (or create) the journal file in append mode
    ///
    /// Creates parent directories if they don't exist
    pub async fn open(log_path: impl AsRef<Path>) -> Result<Self> {
        let log_path = log_path.as_ref();

        if let Some(parent) = log_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("failed to create journal directory")?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .context("failed to open journal file")?;

        Ok(Self {
            log_file: Arc::new(Mutex::new(file)),
        })
    }

    /// Write the event as a JSON line and mirror it to tracing
    pub fn record(&self, event: &LoopEvent) -> Result<()> {
        let json = serde_json::to_string(event).context("failed to serialize loop event")?;

        {
            let mut file = self
                .log_file
                .lock()
                .map_err(|e| anyhow::anyhow!("journal mutex poisoned: {e}"))?;

            writeln!(file, "{json}").context("failed to write loop event")?;
            file.flush().context("failed to flush journal")?;
        }

        info!(
            ticket_id = %event.ticket_id,
            attempt = event.attempt,
            kind = ?event.kind,
            "loop event journaled"
        );

        Ok(())
    }
}

/// Read every event back from a journal file
pub fn read_events(log_path: impl AsRef<Path>) -> Result<Vec<LoopEvent>> {
    let content = std::fs::read_to_string(log_path.as_ref()).context("failed to read journal")?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).context("malformed journal line"))
        .collect()
}
