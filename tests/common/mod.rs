//! Common test utilities for integration tests
//!
//! Provides a fast configuration, scripted collaborators wired into a
//! `TaskRunner`, and helpers for building worker scripts.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use microloop::adapters::{
    HashingEmbedder, InMemoryBacklog, ScriptStep, ScriptedReviewer, ScriptedTestRunner,
    ScriptedWorker, StaticContextProvider,
};
use microloop::application::{LoopCollaborators, TaskRunner};
use microloop::domain::errors::PortResult;
use microloop::domain::models::{
    CandidatePatch, Config, PollReport, PollingConfig, ReviewVerdict, RuleSet, SessionId,
    Severity, Ticket, TicketId, Violation, WorkerStatus,
};
use microloop::domain::ports::HumanInterrupt;

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Default configuration with millisecond polling.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.polling = PollingConfig {
        initial_interval_ms: 5,
        max_interval_ms: 20,
        multiplier: 2.0,
        attempt_timeout_ms: 5_000,
        max_consecutive_poll_errors: 3,
    };
    config.embedding.dimension = 128;
    config
}

pub fn ticket(id: &str) -> Ticket {
    Ticket::new(id, format!("Ticket {id}"), "Implement the tokenizer")
}

/// A `Working` report carrying a trajectory snapshot.
pub fn working(sequence: u64, content: &str) -> ScriptStep {
    ScriptStep::Report(PollReport::status(WorkerStatus::Working).with_snapshot(sequence, content))
}

/// A `ReviewReady` report carrying a one-file patch.
pub fn ready(body: &str) -> ScriptStep {
    ScriptStep::Report(
        PollReport::status(WorkerStatus::ReviewReady)
            .with_candidate(CandidatePatch::from_files([("src/lib.rs", body)])),
    )
}

pub fn blocked(message: &str) -> ScriptStep {
    ScriptStep::Report(PollReport::status(WorkerStatus::Blocked).with_message(message))
}

/// A short healthy session ending with `body` as the patch.
pub fn healthy_session(body: &str) -> Vec<ScriptStep> {
    vec![
        working(1, "reading the tokenizer module and its tests"),
        working(2, "adding a failing test for escaped quotes"),
        ready(body),
    ]
}

pub fn violation() -> Violation {
    Violation::new("no-unwrap", Severity::Critical, "unwrap in library code")
        .at("src/lib.rs", Some(1))
        .with_remedy("propagate the error with ?")
}

/// Human interrupt that records every request.
#[derive(Default)]
pub struct RecordingInterrupt {
    requests: RwLock<Vec<(TicketId, SessionId, Option<String>)>>,
}

impl RecordingInterrupt {
    pub async fn requests(&self) -> Vec<(TicketId, SessionId, Option<String>)> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl HumanInterrupt for RecordingInterrupt {
    async fn request_help(
        &self,
        ticket: &Ticket,
        session_id: &SessionId,
        message: Option<&str>,
    ) -> PortResult<()> {
        self.requests.write().await.push((
            ticket.id.clone(),
            session_id.clone(),
            message.map(str::to_string),
        ));
        Ok(())
    }
}

/// Scripted collaborators plus the config used to build a runner.
pub struct Harness {
    pub worker: Arc<ScriptedWorker>,
    pub tests: Arc<ScriptedTestRunner>,
    pub reviewer: Arc<ScriptedReviewer>,
    pub backlog: Arc<InMemoryBacklog>,
    pub interrupt: Arc<RecordingInterrupt>,
    pub config: Config,
}

impl Harness {
    pub fn new(
        scripts: Vec<Vec<ScriptStep>>,
        test_results: Vec<PortResult<bool>>,
        verdicts: Vec<PortResult<ReviewVerdict>>,
    ) -> Self {
        Self::with_worker(ScriptedWorker::new(scripts), test_results, verdicts)
    }

    pub fn with_worker(
        worker: ScriptedWorker,
        test_results: Vec<PortResult<bool>>,
        verdicts: Vec<PortResult<ReviewVerdict>>,
    ) -> Self {
        Self {
            worker: Arc::new(worker),
            tests: Arc::new(ScriptedTestRunner::new(test_results)),
            reviewer: Arc::new(ScriptedReviewer::new(verdicts)),
            backlog: Arc::new(InMemoryBacklog::new()),
            interrupt: Arc::new(RecordingInterrupt::default()),
            config: fast_config(),
        }
    }

    #[must_use]
    pub fn configure(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn collaborators(&self) -> LoopCollaborators {
        LoopCollaborators {
            worker: self.worker.clone(),
            test_runner: self.tests.clone(),
            reviewer: self.reviewer.clone(),
            embedder: Arc::new(HashingEmbedder::new(self.config.embedding.dimension)),
            backlog: self.backlog.clone(),
            context: Arc::new(StaticContextProvider::default()),
            interrupt: Some(self.interrupt.clone()),
            rules: Arc::new(RuleSet::default()),
        }
    }

    pub fn runner(&self) -> TaskRunner {
        TaskRunner::new(self.collaborators(), &self.config).expect("valid runner config")
    }
}
