//! Scripted test runner for tests and dry runs.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::PortResult;
use crate::domain::models::{CandidatePatch, TestEvidence, TestOutcome};
use crate::domain::ports::TestRunner;

/// Replays a fixed sequence of pass/fail results; the last one repeats.
pub struct ScriptedTestRunner {
    results: Vec<PortResult<bool>>,
    runs: Arc<RwLock<usize>>,
}

impl ScriptedTestRunner {
    pub fn new(results: Vec<PortResult<bool>>) -> Self {
        Self {
            results,
            runs: Arc::new(RwLock::new(0)),
        }
    }

    /// A runner whose every run passes.
    pub fn always_passing() -> Self {
        Self::new(vec![Ok(true)])
    }

    pub async fn run_count(&self) -> usize {
        *self.runs.read().await
    }

    fn failing_evidence() -> TestEvidence {
        TestEvidence {
            failing_tests: vec!["tests::scripted_failure".to_string()],
            output_excerpt: "thread 'tests::scripted_failure' panicked at src/lib.rs:12:9:\n\
                             assertion `left == right` failed\n  left: 3\n right: 4"
                .to_string(),
            exit_code: Some(101),
            passed_count: 0,
            failed_count: 1,
        }
    }
}

#[async_trait]
impl TestRunner for ScriptedTestRunner {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn run_suite(&self, patch: &CandidatePatch) -> PortResult<TestOutcome> {
        let mut runs = self.runs.write().await;
        let index = *runs;
        *runs += 1;

        let result = self
            .results
            .get(index)
            .or_else(|| self.results.last())
            .cloned()
            .unwrap_or(Ok(true))?;

        Ok(if result {
            TestOutcome::passing(
                patch.digest(),
                TestEvidence {
                    passed_count: 1,
                    exit_code: Some(0),
                    ..Default::default()
                },
            )
        } else {
            TestOutcome::failing(patch.digest(), Self::failing_evidence())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::PortError;

    #[tokio::test]
    async fn test_results_replay_in_order_then_repeat() {
        let runner = ScriptedTestRunner::new(vec![Ok(false), Ok(true)]);
        let patch = CandidatePatch::from_files([("a.rs", "a")]);

        assert!(!runner.run_suite(&patch).await.unwrap().passed);
        assert!(runner.run_suite(&patch).await.unwrap().passed);
        assert!(runner.run_suite(&patch).await.unwrap().passed);
        assert_eq!(runner.run_count().await, 3);
    }

    #[tokio::test]
    async fn test_failing_outcome_carries_evidence() {
        let runner = ScriptedTestRunner::new(vec![Ok(false)]);
        let outcome = runner
            .run_suite(&CandidatePatch::from_files([("a.rs", "a")]))
            .await
            .unwrap();
        assert_eq!(outcome.evidence.failing_tests.len(), 1);
        assert!(outcome.evidence.output_excerpt.contains("assertion"));
    }

    #[tokio::test]
    async fn test_error_is_returned() {
        let runner = ScriptedTestRunner::new(vec![Err(PortError::io("scripted", "disk full"))]);
        assert!(runner
            .run_suite(&CandidatePatch::default())
            .await
            .is_err());
    }
}
