//! Micro-loop services: one per stage of the loop.

pub mod architect_gate;
pub mod cancellation;
pub mod entropy_guard;
pub mod feedback_loop;
pub mod health_scorer;
pub mod qa_verifier;
pub mod root_cause;
pub mod task_dispatcher;
pub mod watch_tower;

pub use architect_gate::{apply_stability_protocol, ArchitectGate, GateDecision};
pub use cancellation::{cancellation_pair, CancelSignal, CancellationHandle};
pub use entropy_guard::{EntropyGuard, HealthAssessment};
pub use feedback_loop::{FeedbackDecision, FeedbackLoop};
pub use health_scorer::{cosine_similarity, score_embeddings, HealthScorerConfig, SemanticHealthScorer};
pub use qa_verifier::{QaVerdict, QaVerifier};
pub use root_cause::RootCauseClassifier;
pub use task_dispatcher::TaskDispatcher;
pub use watch_tower::{classify, PollSchedule, WatchState, WatchTower, WatchVerdict};
