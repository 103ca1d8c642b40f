//! Adapters implementing the domain ports.
//!
//! Each port has one production adapter and, where tests need determinism, a
//! scripted in-memory one.

pub mod backlog;
pub mod context;
pub mod embedding;
pub mod interrupt;
pub mod reviewer;
pub mod test_runner;
pub mod worker;

pub use backlog::InMemoryBacklog;
pub use context::{FsContextProvider, StaticContextProvider};
pub use embedding::{HashingEmbedder, OpenAiEmbedder};
pub use interrupt::TracingInterrupt;
pub use reviewer::{RuleSetReviewer, ScriptedReviewer};
pub use test_runner::{CommandTestRunner, ScriptedTestRunner};
pub use worker::{HttpWorker, ScriptStep, ScriptedWorker};
