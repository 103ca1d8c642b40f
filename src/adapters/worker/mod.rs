//! Worker adapters.

pub mod http;
pub mod scripted;

pub use http::HttpWorker;
pub use scripted::{ScriptStep, ScriptedWorker};
