//! Watch tower: polls a worker session until it settles.
//!
//! Poll state machine:
//!
//! ```text
//! Polling ──► Polling        (queued / planning / working; sleep for next backoff)
//!         ──► Ready          (completed / review_ready with a patch)
//!         ──► Blocked        (human channel notified once per episode, keep polling)
//!         ──► WorkerFailed   (reported failure, missing patch, blocked without
//!                             a human channel, timeout, cancellation)
//! ```
//!
//! Each attempt is bounded by a wall-clock ceiling rather than a poll count.
//! Every poll and every backoff sleep is raced against the cancel signal and
//! the deadline.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::domain::errors::{Collaborator, LoopError, PortError, PortResult};
use crate::domain::models::{
    CandidatePatch, PollReport, PollingConfig, SemanticHealthMetric, Ticket, WorkerFailureReason,
    WorkerSession, WorkerStatus,
};
use crate::domain::ports::{HumanInterrupt, Worker};

use super::cancellation::CancelSignal;
use super::entropy_guard::{EntropyGuard, HealthAssessment};

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// What a single poll report means for the watch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    Polling,
    Ready(CandidatePatch),
    Blocked(Option<String>),
    WorkerFailed(WorkerFailureReason),
}

pub fn classify(report: &PollReport) -> WatchState {
    match report.status {
        WorkerStatus::Queued | WorkerStatus::Planning | WorkerStatus::Working => {
            WatchState::Polling
        }
        WorkerStatus::Completed | WorkerStatus::ReviewReady => match &report.candidate {
            Some(patch) if !patch.is_empty() => WatchState::Ready(patch.clone()),
            _ => WatchState::WorkerFailed(WorkerFailureReason::MissingPatch),
        },
        WorkerStatus::Blocked => WatchState::Blocked(report.message.clone()),
        WorkerStatus::Failed => WatchState::WorkerFailed(WorkerFailureReason::Reported {
            message: report.message.clone(),
        }),
    }
}

/// How a watched session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchVerdict {
    Ready(CandidatePatch),
    /// Tunneling detected mid-poll; the session was cancelled
    Tunneling(SemanticHealthMetric),
    WorkerFailed(WorkerFailureReason),
}

// ---------------------------------------------------------------------------
// Poll schedule
// ---------------------------------------------------------------------------

/// Exponential poll intervals, capped at the configured maximum.
pub struct PollSchedule {
    backoff: ExponentialBackoff,
    max_interval: Duration,
}

impl PollSchedule {
    pub fn new(config: &PollingConfig) -> Self {
        let max_interval = Duration::from_millis(config.max_interval_ms);
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(config.initial_interval_ms))
            .with_max_interval(max_interval)
            .with_multiplier(config.multiplier)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build();
        Self {
            backoff,
            max_interval,
        }
    }

    pub fn next_interval(&mut self) -> Duration {
        self.backoff.next_backoff().unwrap_or(self.max_interval)
    }

    pub fn reset(&mut self) {
        self.backoff.reset();
    }
}

// ---------------------------------------------------------------------------
// WatchTower
// ---------------------------------------------------------------------------

enum Tick {
    Cancelled,
    TimedOut,
    Polled(PortResult<PollReport>),
}

pub struct WatchTower {
    worker: Arc<dyn Worker>,
    interrupt: Option<Arc<dyn HumanInterrupt>>,
    polling: PollingConfig,
    interrupt_on_poll: bool,
}

impl WatchTower {
    pub fn new(
        worker: Arc<dyn Worker>,
        interrupt: Option<Arc<dyn HumanInterrupt>>,
        polling: PollingConfig,
        interrupt_on_poll: bool,
    ) -> Self {
        Self {
            worker,
            interrupt,
            polling,
            interrupt_on_poll,
        }
    }

    /// Poll the session until it is ready, fails, tunnels, times out or is cancelled.
    ///
    /// Exhausting `max_consecutive_poll_errors` or an embedder fault during
    /// scoring surfaces as an error; the session is cancelled at the worker first.
    pub async fn watch(
        &self,
        ticket: &Ticket,
        session: &mut WorkerSession,
        guard: &EntropyGuard,
        cancel: &mut CancelSignal,
    ) -> Result<WatchVerdict, LoopError> {
        let limit_ms = self.polling.attempt_timeout_ms;
        let deadline = Instant::now() + Duration::from_millis(limit_ms);
        let session_id = session.session_id.clone();
        let mut schedule = PollSchedule::new(&self.polling);
        let mut consecutive_errors = 0u32;
        let mut blocked_notified = false;

        loop {
            let tick = tokio::select! {
                biased;
                () = cancel.cancelled() => Tick::Cancelled,
                () = sleep_until(deadline) => Tick::TimedOut,
                result = self.worker.poll_status(&session_id) => Tick::Polled(result),
            };

            let report = match tick {
                Tick::Cancelled => {
                    return Ok(self.abandon(session, WorkerFailureReason::Cancelled).await);
                }
                Tick::TimedOut => {
                    return Ok(self
                        .abandon(session, WorkerFailureReason::Timeout { limit_ms })
                        .await);
                }
                Tick::Polled(Err(PortError::UnknownSession(_))) => {
                    session.status = WorkerStatus::Failed;
                    let reason = WorkerFailureReason::SessionLost {
                        session_id: session_id.to_string(),
                    };
                    warn!(session_id = %session_id, reason = %reason.describe(), "worker failed");
                    return Ok(WatchVerdict::WorkerFailed(reason));
                }
                Tick::Polled(Err(err)) => {
                    consecutive_errors += 1;
                    if consecutive_errors > self.polling.max_consecutive_poll_errors {
                        return Err(self
                            .fail(session, LoopError::infra(Collaborator::Worker)(err))
                            .await);
                    }
                    warn!(
                        session_id = %session_id,
                        consecutive_errors,
                        error = %err,
                        "poll failed, will retry"
                    );
                    None
                }
                Tick::Polled(Ok(report)) => {
                    consecutive_errors = 0;
                    Some(report)
                }
            };

            if let Some(report) = report {
                session.status = report.status;
                let fresh_snapshot = report
                    .snapshot
                    .clone()
                    .is_some_and(|snapshot| EntropyGuard::record(session, snapshot));

                match classify(&report) {
                    WatchState::Polling => {
                        if blocked_notified {
                            schedule.reset();
                        }
                        blocked_notified = false;
                        if fresh_snapshot && self.interrupt_on_poll {
                            match guard.assess(session).await {
                                Ok(HealthAssessment::Tunneling(metric)) => {
                                    self.cancel_best_effort(session).await;
                                    session.status = WorkerStatus::Failed;
                                    return Ok(WatchVerdict::Tunneling(metric));
                                }
                                Ok(HealthAssessment::Healthy(_)) => {}
                                Err(err) => return Err(self.fail(session, err).await),
                            }
                        }
                    }
                    WatchState::Ready(patch) => {
                        info!(
                            session_id = %session_id,
                            files = patch.files.len(),
                            digest = %patch.digest(),
                            "candidate patch ready"
                        );
                        session.candidate = Some(patch.clone());
                        return Ok(WatchVerdict::Ready(patch));
                    }
                    WatchState::Blocked(message) => {
                        let Some(interrupt) = &self.interrupt else {
                            return Ok(WatchVerdict::WorkerFailed(WorkerFailureReason::Blocked {
                                message,
                            }));
                        };
                        if !blocked_notified {
                            if let Err(err) = interrupt
                                .request_help(ticket, &session_id, message.as_deref())
                                .await
                            {
                                warn!(session_id = %session_id, error = %err, "human interrupt unavailable");
                                return Ok(WatchVerdict::WorkerFailed(
                                    WorkerFailureReason::Blocked { message },
                                ));
                            }
                            info!(session_id = %session_id, "worker blocked, human notified");
                            blocked_notified = true;
                        }
                    }
                    WatchState::WorkerFailed(reason) => {
                        warn!(session_id = %session_id, reason = %reason.describe(), "worker failed");
                        return Ok(WatchVerdict::WorkerFailed(reason));
                    }
                }
            }

            let interval = schedule.next_interval();
            debug!(
                session_id = %session_id,
                interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
                "waiting before next poll"
            );
            let tick = tokio::select! {
                biased;
                () = cancel.cancelled() => Some(Tick::Cancelled),
                () = sleep_until(deadline) => Some(Tick::TimedOut),
                () = sleep(interval) => None,
            };
            match tick {
                Some(Tick::Cancelled) => {
                    return Ok(self.abandon(session, WorkerFailureReason::Cancelled).await);
                }
                Some(Tick::TimedOut) => {
                    return Ok(self
                        .abandon(session, WorkerFailureReason::Timeout { limit_ms })
                        .await);
                }
                _ => {}
            }
        }
    }

    async fn abandon(&self, session: &mut WorkerSession, reason: WorkerFailureReason) -> WatchVerdict {
        warn!(
            session_id = %session.session_id,
            reason = %reason.describe(),
            "abandoning session"
        );
        self.cancel_best_effort(session).await;
        session.status = WorkerStatus::Failed;
        WatchVerdict::WorkerFailed(reason)
    }

    /// Stop the session at the worker before surfacing an infrastructure fault.
    async fn fail(&self, session: &mut WorkerSession, err: LoopError) -> LoopError {
        warn!(session_id = %session.session_id, error = %err, "abandoning session after infrastructure fault");
        self.cancel_best_effort(session).await;
        session.status = WorkerStatus::Failed;
        err
    }

    async fn cancel_best_effort(&self, session: &WorkerSession) {
        if let Err(err) = self.worker.cancel_session(&session.session_id).await {
            warn!(session_id = %session.session_id, error = %err, "failed to cancel session at worker");
        }
    }
}
