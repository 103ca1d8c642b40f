//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that adapters must implement:
//! - Worker: the remote code-generation agent
//! - TestRunner: isolated deterministic verification
//! - Reviewer: architectural governance review
//! - TrajectoryEmbedder: semantic vectors for entropy scoring
//! - Backlog, ContextProvider, HumanInterrupt: supporting collaborators

pub mod backlog;
pub mod context_provider;
pub mod embedder;
pub mod interrupt;
pub mod reviewer;
pub mod test_runner;
pub mod worker;

pub use backlog::Backlog;
pub use context_provider::ContextProvider;
pub use embedder::TrajectoryEmbedder;
pub use interrupt::HumanInterrupt;
pub use reviewer::Reviewer;
pub use test_runner::TestRunner;
pub use worker::Worker;
