//! QA verifier: deterministic test gate for candidate patches.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::errors::{Collaborator, LoopError};
use crate::domain::models::{CandidatePatch, TestOutcome, WorkerSession};
use crate::domain::ports::TestRunner;

#[derive(Debug, Clone, PartialEq)]
pub enum QaVerdict {
    Passed(TestOutcome),
    Failed(TestOutcome),
}

impl QaVerdict {
    pub const fn outcome(&self) -> &TestOutcome {
        match self {
            Self::Passed(outcome) | Self::Failed(outcome) => outcome,
        }
    }
}

/// Memoised outcomes, evicted oldest first once `capacity` is reached.
struct OutcomeCache {
    entries: HashMap<String, TestOutcome>,
    order: VecDeque<String>,
    capacity: usize,
}

impl OutcomeCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, digest: &str) -> Option<TestOutcome> {
        self.entries.get(digest).cloned()
    }

    fn insert(&mut self, digest: String, outcome: TestOutcome) {
        if self.capacity == 0 || self.entries.contains_key(&digest) {
            return;
        }
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        self.order.push_back(digest.clone());
        self.entries.insert(digest, outcome);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Runs the test suite once per distinct patch.
///
/// Deterministic outcomes are cached by patch digest, so a resubmitted
/// identical patch gets the identical verdict without touching the runner
/// again. Timed-out runs are never cached.
pub struct QaVerifier {
    runner: Arc<dyn TestRunner>,
    outcomes: RwLock<OutcomeCache>,
}

impl QaVerifier {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(runner: Arc<dyn TestRunner>) -> Self {
        Self::with_capacity(runner, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(runner: Arc<dyn TestRunner>, capacity: usize) -> Self {
        Self {
            runner,
            outcomes: RwLock::new(OutcomeCache::new(capacity)),
        }
    }

    pub async fn cached_outcomes(&self) -> usize {
        self.outcomes.read().await.len()
    }

    pub async fn verify(
        &self,
        session: &mut WorkerSession,
        patch: &CandidatePatch,
    ) -> Result<QaVerdict, LoopError> {
        let digest = patch.digest();

        let cached = self.outcomes.read().await.get(&digest);
        let outcome = if let Some(outcome) = cached {
            debug!(digest = %digest, "reusing memoised test outcome");
            outcome
        } else {
            let outcome = self
                .runner
                .run_suite(patch)
                .await
                .map_err(LoopError::infra(Collaborator::TestRunner))?;
            if outcome.is_deterministic() {
                self.outcomes
                    .write()
                    .await
                    .insert(digest.clone(), outcome.clone());
            } else {
                warn!(digest = %digest, "test run timed out, outcome not memoised");
            }
            outcome
        };

        info!(
            session_id = %session.session_id,
            attempt = session.attempt,
            runner = self.runner.name(),
            passed = outcome.passed,
            passed_count = outcome.evidence.passed_count,
            failed_count = outcome.evidence.failed_count,
            "test suite finished"
        );

        session.test_history.push(outcome.clone());
        if outcome.passed {
            Ok(QaVerdict::Passed(outcome))
        } else {
            Ok(QaVerdict::Failed(outcome))
        }
    }
}
