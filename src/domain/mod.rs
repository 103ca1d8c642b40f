//! Domain layer for the micro-loop
//!
//! This module contains the core models, the port traits adapters implement,
//! and the error types shared by every layer.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{Collaborator, DomainError, DomainResult, LoopError, PortError, PortResult};
