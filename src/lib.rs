//! Microloop - autonomous task-execution micro-loop
//!
//! Microloop takes one ticket at a time and drives it to a terminal outcome:
//! dispatch to a remote worker, watch its trajectory for semantic loops, verify
//! the candidate against the test suite in isolation, review it against
//! governance rules, and feed every failure back as corrective instructions
//! until the retry ceiling is reached.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, port traits, and error types
//! - **Service Layer** (`services`): one service per loop stage
//! - **Application Layer** (`application`): the `TaskRunner` state machine
//! - **Adapters** (`adapters`): HTTP worker, command test runner, rule-set reviewer, embedders
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging, transition journal
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use microloop::application::{LoopCollaborators, TaskRunner};
//! use microloop::services::CancelSignal;
//!
//! let runner = TaskRunner::new(collaborators, &config)?;
//! let outcome = runner.run_task(ticket, CancelSignal::never()).await?;
//! println!("{} after {} dispatch(es)", outcome.status, outcome.dispatch_count);
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{LoopCollaborators, LoopStage, TaskRunner};
pub use domain::errors::{LoopError, PortError};
pub use domain::models::{
    CandidatePatch, Config, RunStatus, TaskOutcome, TechDebtTag, Ticket, TicketId, TicketStatus,
};
pub use domain::ports::{
    Backlog, ContextProvider, HumanInterrupt, Reviewer, TestRunner, TrajectoryEmbedder, Worker,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{cancellation_pair, CancelSignal, CancellationHandle};
