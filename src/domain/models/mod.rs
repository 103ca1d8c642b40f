//! Domain models for the micro-loop.

pub mod config;
pub mod context;
pub mod feedback;
pub mod health;
pub mod session;
pub mod state;
pub mod ticket;
pub mod verification;

pub use config::{
    Config, ContextConfig, EmbeddingConfig, EmbeddingProviderKind, EscalationConfig,
    JournalConfig, LoggingConfig, LoopPolicyConfig, PollingConfig, ReviewerConfig,
    TestRunnerConfig, WorkerConfig,
};
pub use context::{ContextSlice, FileExcerpt};
pub use feedback::{FailureEvidence, FailureKind, FailureRecord, RootCause, WorkerFailureReason};
pub use health::SemanticHealthMetric;
pub use session::{
    CandidatePatch, PollReport, SessionId, TrajectorySnapshot, WorkerSession, WorkerStatus,
};
pub use state::{EngineeringState, EscalationReason, RunStatus, TaskOutcome};
pub use ticket::{Ticket, TicketId, TicketStatus};
pub use verification::{
    GovernanceRule, ReviewStatus, ReviewVerdict, RuleSet, Severity, TechDebtTag, TestEvidence,
    TestOutcome, Violation, ViolationLocation,
};
