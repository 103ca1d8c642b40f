use async_trait::async_trait;

use crate::domain::errors::PortResult;
use crate::domain::models::{CandidatePatch, TestOutcome};

/// Deterministic test execution against a candidate patch.
///
/// Implementations must run in isolation and never touch the live workspace.
/// An `Err` means the runner itself is unavailable; failing tests are an
/// `Ok(TestOutcome)` with `passed == false`.
#[async_trait]
pub trait TestRunner: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run_suite(&self, patch: &CandidatePatch) -> PortResult<TestOutcome>;
}
