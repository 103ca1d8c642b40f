//! Domain errors for the micro-loop.
//!
//! Three layers of failure are kept apart:
//! - [`DomainError`]: illegal state changes and invalid inputs inside the domain model.
//! - [`PortError`]: a collaborator behind a port could not answer.
//! - [`LoopError`]: what `run_task` surfaces to its caller. Task faults never
//!   appear here; they are absorbed by the feedback loop.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::models::TicketId;

/// Domain-level errors raised by the models themselves.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Failure reported by an adapter sitting behind a port.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("{service} unreachable: {reason}")]
    Unreachable { service: String, reason: String },

    #[error("{service} returned an invalid response: {reason}")]
    InvalidResponse { service: String, reason: String },

    #[error("{service} I/O failure: {reason}")]
    Io { service: String, reason: String },

    #[error("Unknown session: {0}")]
    UnknownSession(String),
}

impl PortError {
    pub fn unreachable(service: &str, reason: impl fmt::Display) -> Self {
        Self::Unreachable {
            service: service.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_response(service: &str, reason: impl fmt::Display) -> Self {
        Self::InvalidResponse {
            service: service.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn io(service: &str, reason: impl fmt::Display) -> Self {
        Self::Io {
            service: service.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type PortResult<T> = Result<T, PortError>;

/// The collaborator whose port produced an infrastructure fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collaborator {
    Worker,
    TestRunner,
    Reviewer,
    Embedder,
    Backlog,
    ContextProvider,
}

impl Collaborator {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Worker => "worker",
            Self::TestRunner => "test_runner",
            Self::Reviewer => "reviewer",
            Self::Embedder => "embedder",
            Self::Backlog => "backlog",
            Self::ContextProvider => "context_provider",
        }
    }
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by `TaskRunner::run_task`.
///
/// Infrastructure faults propagate immediately and are never retried.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("Infrastructure fault in {collaborator}: {source}")]
    Infrastructure {
        collaborator: Collaborator,
        #[source]
        source: PortError,
    },

    #[error("Ticket {ticket} is not ready: unmet dependencies [{}]", format_ids(.unmet))]
    TicketNotReady { ticket: TicketId, unmet: Vec<TicketId> },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl LoopError {
    /// Build a mapper for `map_err` that tags a port failure with its collaborator.
    pub fn infra(collaborator: Collaborator) -> impl FnOnce(PortError) -> Self {
        move |source| Self::Infrastructure {
            collaborator,
            source,
        }
    }

    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Infrastructure { .. })
    }
}

fn format_ids(ids: &[TicketId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
