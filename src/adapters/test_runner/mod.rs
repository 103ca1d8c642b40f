//! Test runner adapters.

pub mod command;
pub mod output_parser;
pub mod scripted;

pub use command::CommandTestRunner;
pub use scripted::ScriptedTestRunner;
