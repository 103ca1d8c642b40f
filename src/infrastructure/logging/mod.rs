//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty formatting on stderr
//! - Rotated JSON log files
//! - Secret scrubbing for worker and test evidence
//! - Transition journal

pub mod config;
pub mod journal;
pub mod logger;
pub mod secret_scrubbing;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use journal::{LoopEvent, LoopEventKind, TransitionJournal};
pub use logger::LoggerImpl;
pub use secret_scrubbing::SecretScrubber;
