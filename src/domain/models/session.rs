//! Worker session domain model.
//!
//! A [`WorkerSession`] is one attempt by the remote worker at one ticket. It is
//! created on dispatch and replaced wholesale when the ticket is re-dispatched.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::health::SemanticHealthMetric;
use super::verification::TestOutcome;

/// Identifier the worker assigns to a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status reported by the worker for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    #[serde(alias = "QUEUED")]
    Queued,
    #[serde(alias = "PLANNING")]
    Planning,
    #[serde(alias = "WORKING")]
    Working,
    #[serde(alias = "REVIEW_READY")]
    ReviewReady,
    #[serde(alias = "COMPLETED")]
    Completed,
    #[serde(alias = "BLOCKED")]
    Blocked,
    #[serde(alias = "FAILED")]
    Failed,
}

impl WorkerStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Planning => "planning",
            Self::Working => "working",
            Self::ReviewReady => "review_ready",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
        }
    }

    /// The worker is still busy and should be polled again.
    pub const fn is_in_flight(&self) -> bool {
        matches!(self, Self::Queued | Self::Planning | Self::Working)
    }

    /// The worker claims to have produced a candidate patch.
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::ReviewReady | Self::Completed)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One intermediate output of the worker, in the order the worker produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySnapshot {
    /// Monotonic per session, assigned by the worker
    pub sequence: u64,
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
    /// The worker's latest action or output text
    pub content: String,
}

impl TrajectorySnapshot {
    pub fn new(sequence: u64, content: impl Into<String>) -> Self {
        Self {
            sequence,
            observed_at: Utc::now(),
            content: content.into(),
        }
    }
}

/// The worker's proposed change.
///
/// `files` holds the full resulting content of every touched file; that map is
/// what the reviewer sees. `diff` is informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePatch {
    #[serde(default)]
    pub diff: Option<String>,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl CandidatePatch {
    pub fn from_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        Self {
            diff: None,
            files: files
                .into_iter()
                .map(|(path, content)| (path.into(), content.into()))
                .collect(),
        }
    }

    #[must_use]
    pub fn with_diff(mut self, diff: impl Into<String>) -> Self {
        self.diff = Some(diff.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.diff.as_deref().map_or(true, str::is_empty)
    }

    /// Content digest of the patch; identical patches share a digest.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (path, content) in &self.files {
            hasher.update(path.as_bytes());
            hasher.update(&[0]);
            hasher.update(content.as_bytes());
            hasher.update(&[0]);
        }
        if let Some(diff) = &self.diff {
            hasher.update(b"diff\0");
            hasher.update(diff.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// What a single `poll_status` call returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollReport {
    pub status: WorkerStatus,
    #[serde(default)]
    pub snapshot: Option<TrajectorySnapshot>,
    #[serde(default, alias = "patch")]
    pub candidate: Option<CandidatePatch>,
    /// Free-form note from the worker, e.g. why it is blocked
    #[serde(default)]
    pub message: Option<String>,
}

impl PollReport {
    pub const fn status(status: WorkerStatus) -> Self {
        Self {
            status,
            snapshot: None,
            candidate: None,
            message: None,
        }
    }

    #[must_use]
    pub fn with_snapshot(mut self, sequence: u64, content: impl Into<String>) -> Self {
        self.snapshot = Some(TrajectorySnapshot::new(sequence, content));
        self
    }

    #[must_use]
    pub fn with_candidate(mut self, candidate: CandidatePatch) -> Self {
        self.candidate = Some(candidate);
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// One attempt by the worker at one ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSession {
    pub session_id: SessionId,
    /// 1-based dispatch number within the ticket's loop
    pub attempt: u32,
    pub status: WorkerStatus,
    pub dispatched_at: DateTime<Utc>,
    pub trajectory: Vec<TrajectorySnapshot>,
    pub test_history: Vec<TestOutcome>,
    /// Stability protocol counter; never exceeds 1
    pub architect_refactor_attempts: u32,
    pub candidate: Option<CandidatePatch>,
    pub health: Option<SemanticHealthMetric>,
}

impl WorkerSession {
    pub fn new(session_id: SessionId, attempt: u32, architect_refactor_attempts: u32) -> Self {
        Self {
            session_id,
            attempt,
            status: WorkerStatus::Queued,
            dispatched_at: Utc::now(),
            trajectory: Vec::new(),
            test_history: Vec::new(),
            architect_refactor_attempts: architect_refactor_attempts.min(1),
            candidate: None,
            health: None,
        }
    }

    /// Append a snapshot unless one with the same sequence was already seen.
    ///
    /// Returns `true` when the trajectory grew.
    pub fn record_snapshot(&mut self, snapshot: TrajectorySnapshot) -> bool {
        if self
            .trajectory
            .iter()
            .any(|existing| existing.sequence == snapshot.sequence)
        {
            return false;
        }
        self.trajectory.push(snapshot);
        true
    }

    pub fn last_test_outcome(&self) -> Option<&TestOutcome> {
        self.test_history.last()
    }
}
