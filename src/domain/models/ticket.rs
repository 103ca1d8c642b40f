//! Ticket domain model.
//!
//! A ticket is the unit of work handed to the micro-loop. Its status follows a
//! closed transition table and reaches a terminal value exactly once.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

/// Identifier of a ticket in the backlog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TicketId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Lifecycle status of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Not yet dispatched
    #[default]
    Pending,
    /// A worker session is (or was just) working on it
    InProgress,
    /// Accepted by the architect gate
    Done,
    /// Retries exhausted or cancelled
    Failed,
}

impl TicketStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" | "in-progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Valid transitions from this status.
    ///
    /// `InProgress -> InProgress` covers re-dispatch after a retry.
    pub fn valid_transitions(&self) -> Vec<Self> {
        match self {
            Self::Pending => vec![Self::InProgress],
            Self::InProgress => vec![Self::InProgress, Self::Done, Self::Failed],
            Self::Done | Self::Failed => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work cut from a design document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub title: String,
    pub description: String,

    /// Tickets that must be `Done` before this one may be dispatched, in order
    #[serde(default)]
    pub dependencies: Vec<TicketId>,

    #[serde(default)]
    pub status: TicketStatus,

    /// Pointer back to the document section this ticket was cut from
    #[serde(default)]
    pub source_section: Option<String>,

    /// Workspace-relative files the worker should see
    #[serde(default)]
    pub context_files: Vec<String>,
}

impl Ticket {
    pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: TicketId::new(id),
            title: title.into(),
            description: description.into(),
            dependencies: Vec::new(),
            status: TicketStatus::Pending,
            source_section: None,
            context_files: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<TicketId>) -> Self {
        self.dependencies = dependencies;
        self
    }

    #[must_use]
    pub fn with_source_section(mut self, section: impl Into<String>) -> Self {
        self.source_section = Some(section.into());
        self
    }

    #[must_use]
    pub fn with_context_files(mut self, files: Vec<String>) -> Self {
        self.context_files = files;
        self
    }

    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `new_status`, enforcing the transition table.
    pub fn transition_to(&mut self, new_status: TicketStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
                reason: format!("ticket {} does not allow this transition", self.id),
            });
        }
        self.status = new_status;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redispatch_keeps_in_progress() {
        let mut ticket = Ticket::new("T-1", "Add parser", "Implement the parser");
        ticket.transition_to(TicketStatus::InProgress).unwrap();
        ticket.transition_to(TicketStatus::InProgress).unwrap();
        assert_eq!(ticket.status, TicketStatus::InProgress);
    }

    #[test]
    fn test_terminal_status_is_set_once() {
        let mut ticket = Ticket::new("T-1", "Add parser", "Implement the parser");
        ticket.transition_to(TicketStatus::InProgress).unwrap();
        ticket.transition_to(TicketStatus::Done).unwrap();

        let err = ticket.transition_to(TicketStatus::Failed).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
        assert!(ticket.transition_to(TicketStatus::Done).is_err());
        assert_eq!(ticket.status, TicketStatus::Done);
    }

    #[test]
    fn test_pending_cannot_finish_without_dispatch() {
        let mut ticket = Ticket::new("T-1", "Add parser", "Implement the parser");
        assert!(ticket.transition_to(TicketStatus::Done).is_err());
        assert!(ticket.transition_to(TicketStatus::Failed).is_err());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            TicketStatus::Pending,
            TicketStatus::InProgress,
            TicketStatus::Done,
            TicketStatus::Failed,
        ] {
            assert_eq!(TicketStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(TicketStatus::from_str("unknown"), None);
    }

    #[test]
    fn test_ticket_yaml_defaults() {
        let yaml = r"
id: T-7
title: Wire the CLI
description: Add the run command
dependencies: [T-5, T-6]
";
        let ticket: Ticket = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(ticket.status, TicketStatus::Pending);
        assert_eq!(ticket.dependencies, vec![TicketId::new("T-5"), TicketId::new("T-6")]);
        assert!(ticket.context_files.is_empty());
        assert!(ticket.source_section.is_none());
    }
}
