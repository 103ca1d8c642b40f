//! Entropy guard: detects a worker that keeps restating the same step.

use tracing::{debug, warn};

use crate::domain::errors::{Collaborator, LoopError};
use crate::domain::models::{SemanticHealthMetric, TrajectorySnapshot, WorkerSession};

use super::health_scorer::SemanticHealthScorer;

/// Result of checking a session's trajectory.
#[derive(Debug, Clone, PartialEq)]
pub enum HealthAssessment {
    Healthy(SemanticHealthMetric),
    Tunneling(SemanticHealthMetric),
}

impl HealthAssessment {
    pub const fn metric(&self) -> &SemanticHealthMetric {
        match self {
            Self::Healthy(metric) | Self::Tunneling(metric) => metric,
        }
    }

    pub const fn is_tunneling(&self) -> bool {
        matches!(self, Self::Tunneling(_))
    }
}

pub struct EntropyGuard {
    scorer: SemanticHealthScorer,
}

impl EntropyGuard {
    pub const fn new(scorer: SemanticHealthScorer) -> Self {
        Self { scorer }
    }

    /// Append a snapshot unless one with the same sequence was already seen.
    pub fn record(session: &mut WorkerSession, snapshot: TrajectorySnapshot) -> bool {
        session.record_snapshot(snapshot)
    }

    /// Score the session's trailing window and store the metric on it.
    pub async fn assess(&self, session: &mut WorkerSession) -> Result<HealthAssessment, LoopError> {
        let metric = self
            .scorer
            .score(&session.trajectory)
            .await
            .map_err(LoopError::infra(Collaborator::Embedder))?;
        session.health = Some(metric.clone());

        if metric.is_tunneling {
            warn!(
                session_id = %session.session_id,
                attempt = session.attempt,
                score = metric.score,
                threshold = metric.threshold,
                near_duplicates = metric.near_duplicate_pairs,
                "tunneling detected"
            );
            Ok(HealthAssessment::Tunneling(metric))
        } else {
            debug!(
                session_id = %session.session_id,
                score = metric.score,
                window_len = metric.window_len,
                "trajectory healthy"
            );
            Ok(HealthAssessment::Healthy(metric))
        }
    }
}
