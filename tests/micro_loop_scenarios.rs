//! End-to-end micro-loop scenarios driven by scripted collaborators.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    blocked, healthy_session, ready, setup_test_logging, ticket, violation, working, Harness,
};
use microloop::adapters::{ScriptStep, ScriptedWorker};
use microloop::domain::errors::{Collaborator, LoopError, PortError};
use microloop::domain::models::{
    EscalationReason, FailureEvidence, FailureKind, PollReport, ReviewVerdict, RunStatus,
    SessionId, TicketId, TicketStatus, WorkerFailureReason, WorkerStatus,
};
use microloop::infrastructure::logging::journal::read_events;
use microloop::infrastructure::logging::{LoopEventKind, TransitionJournal};
use microloop::services::{cancellation_pair, CancelSignal};

#[tokio::test]
async fn test_clean_run_completes_on_first_dispatch() {
    setup_test_logging();
    let harness = Harness::new(
        vec![healthy_session("pub fn tokenize() {}")],
        vec![Ok(true)],
        vec![Ok(ReviewVerdict::approved())],
    );

    let outcome = harness
        .runner()
        .run_task(ticket("T-1"), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Done);
    assert_eq!(outcome.dispatch_count, 1);
    assert_eq!(outcome.retries_used, 0);
    assert!(outcome.tech_debt_tag.is_none());
    assert!(outcome.failure_history.is_empty());
    assert_eq!(
        outcome.final_patch.unwrap().files["src/lib.rs"],
        "pub fn tokenize() {}"
    );
    assert_eq!(
        harness.backlog.history(&TicketId::new("T-1")).await,
        vec![TicketStatus::InProgress, TicketStatus::Done]
    );
    assert_eq!(harness.reviewer.review_count().await, 1);
}

#[tokio::test]
async fn test_failing_tests_feed_back_into_second_attempt() {
    let harness = Harness::new(
        vec![
            healthy_session("pub fn tokenize() { todo!() }"),
            healthy_session("pub fn tokenize() {}"),
        ],
        vec![Ok(false), Ok(true)],
        vec![Ok(ReviewVerdict::approved())],
    );

    let outcome = harness
        .runner()
        .run_task(ticket("T-1"), CancelSignal::never())
        .await
        .unwrap();

    assert!(outcome.is_done());
    assert_eq!(outcome.dispatch_count, 2);
    assert_eq!(outcome.retries_used, 1);
    assert_eq!(outcome.failure_history.len(), 1);
    assert_eq!(outcome.failure_history[0].kind, FailureKind::TestFailure);

    let contexts = harness.worker.opened_contexts().await;
    assert_eq!(contexts.len(), 2);
    assert!(!contexts[0].is_retry());
    assert!(contexts[1].is_retry());
    assert!(contexts[1]
        .corrective_instructions
        .iter()
        .any(|line| line.contains("tests::scripted_failure")));
    assert_eq!(
        harness.backlog.history(&TicketId::new("T-1")).await,
        vec![
            TicketStatus::InProgress,
            TicketStatus::InProgress,
            TicketStatus::Done
        ]
    );
}

#[tokio::test]
async fn test_second_rejection_is_accepted_as_tech_debt() {
    let harness = Harness::new(
        vec![healthy_session("let x = y.unwrap();")],
        vec![Ok(true)],
        vec![
            Ok(ReviewVerdict::rejected(vec![violation()])),
            Ok(ReviewVerdict::rejected(vec![violation()])),
        ],
    );

    let outcome = harness
        .runner()
        .run_task(ticket("T-1"), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Done);
    assert_eq!(outcome.dispatch_count, 2);
    assert_eq!(outcome.retries_used, 1);
    let tag = outcome.tech_debt_tag.expect("fallback attaches a tech-debt tag");
    assert_eq!(tag.violations.len(), 1);
    assert_eq!(tag.violations[0].rule_id, "no-unwrap");
    assert_eq!(outcome.architect_refactor_attempts, 1);

    let contexts = harness.worker.opened_contexts().await;
    assert!(contexts[1]
        .corrective_instructions
        .iter()
        .any(|line| line.contains("propagate the error with ?")));
}

#[tokio::test]
async fn test_approval_after_rejection_has_no_tech_debt() {
    let harness = Harness::new(
        vec![healthy_session("let x = y.unwrap();"), healthy_session("let x = y?;")],
        vec![Ok(true)],
        vec![
            Ok(ReviewVerdict::rejected(vec![violation()])),
            Ok(ReviewVerdict::approved()),
        ],
    );

    let outcome = harness
        .runner()
        .run_task(ticket("T-1"), CancelSignal::never())
        .await
        .unwrap();

    assert!(outcome.is_done());
    assert!(outcome.tech_debt_tag.is_none());
    assert_eq!(outcome.dispatch_count, 2);
}

#[tokio::test]
async fn test_tunneling_cancels_session_and_costs_two_retries() {
    let stuck = vec![
        working(1, "retrying the same cargo build command again"),
        working(2, "retrying the same cargo build command again"),
        working(3, "retrying the same cargo build command again"),
        working(4, "retrying the same cargo build command again"),
    ];
    let harness = Harness::new(
        vec![stuck, healthy_session("pub fn tokenize() {}")],
        vec![Ok(true)],
        vec![Ok(ReviewVerdict::approved())],
    );

    let outcome = harness
        .runner()
        .run_task(ticket("T-1"), CancelSignal::never())
        .await
        .unwrap();

    assert!(outcome.is_done());
    assert_eq!(outcome.dispatch_count, 2);
    assert_eq!(outcome.retries_used, 2);
    assert_eq!(outcome.failure_history[0].kind, FailureKind::Tunneling);
    match &outcome.failure_history[0].evidence {
        FailureEvidence::Degenerate { metric } => {
            assert!(metric.is_tunneling);
            assert!(metric.score > metric.threshold);
        }
        other => panic!("expected degenerate evidence, got {other:?}"),
    }

    // The tunneling session never reached QA or review.
    assert_eq!(harness.tests.run_count().await, 1);
    assert_eq!(harness.reviewer.review_count().await, 1);
    assert_eq!(
        harness.worker.cancelled_sessions().await,
        vec![SessionId::new("scripted-1")]
    );
    assert!(harness.worker.opened_contexts().await[1]
        .corrective_instructions
        .iter()
        .any(|line| line.contains("fundamentally different approach")));
}

#[tokio::test]
async fn test_retry_ceiling_bounds_dispatches() {
    let harness = Harness::new(
        vec![healthy_session("pub fn broken() {}")],
        vec![Ok(false)],
        vec![Ok(ReviewVerdict::approved())],
    );

    let outcome = harness
        .runner()
        .run_task(ticket("T-1"), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.escalation, Some(EscalationReason::RetriesExhausted));
    assert_eq!(outcome.dispatch_count, 4);
    assert_eq!(outcome.retries_used, 3);
    assert_eq!(outcome.failure_history.len(), 4);
    assert!(outcome.final_patch.is_none());
    assert_eq!(
        harness.backlog.history(&TicketId::new("T-1")).await.last(),
        Some(&TicketStatus::Failed)
    );
    assert_eq!(harness.reviewer.review_count().await, 0);
}

#[tokio::test]
async fn test_zero_ceiling_escalates_after_first_failure() {
    let harness = Harness::new(
        vec![healthy_session("pub fn broken() {}")],
        vec![Ok(false)],
        vec![Ok(ReviewVerdict::approved())],
    )
    .configure(|config| config.loop_policy.retry_ceiling = 0);

    let outcome = harness
        .runner()
        .run_task(ticket("T-1"), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.dispatch_count, 1);
    assert_eq!(outcome.retries_used, 0);
    assert_eq!(outcome.failure_history.len(), 1);
}

#[tokio::test]
async fn test_identical_patch_is_tested_once() {
    let harness = Harness::new(
        vec![healthy_session("pub fn same() {}")],
        vec![Ok(false), Ok(true)],
        vec![Ok(ReviewVerdict::approved())],
    )
    .configure(|config| config.loop_policy.retry_ceiling = 1);

    let outcome = harness
        .runner()
        .run_task(ticket("T-1"), CancelSignal::never())
        .await
        .unwrap();

    // The resubmitted patch keeps its memoised failing verdict.
    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.dispatch_count, 2);
    assert_eq!(harness.tests.run_count().await, 1);
}

#[tokio::test]
async fn test_attempt_timeout_abandons_session() {
    let harness = Harness::new(
        vec![vec![working(1, "still reading the codebase")]],
        vec![Ok(true)],
        vec![Ok(ReviewVerdict::approved())],
    )
    .configure(|config| {
        config.polling.attempt_timeout_ms = 100;
        config.loop_policy.retry_ceiling = 0;
    });

    let outcome = harness
        .runner()
        .run_task(ticket("T-1"), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(matches!(
        outcome.failure_history[0].evidence,
        FailureEvidence::Worker {
            reason: WorkerFailureReason::Timeout { limit_ms: 100 }
        }
    ));
    assert_eq!(
        harness.worker.cancelled_sessions().await,
        vec![SessionId::new("scripted-1")]
    );
    assert_eq!(harness.tests.run_count().await, 0);
}

#[tokio::test]
async fn test_cancellation_escalates_without_charging_retries() {
    let harness = Harness::new(
        vec![vec![working(1, "thinking about the tokenizer")]],
        vec![Ok(true)],
        vec![Ok(ReviewVerdict::approved())],
    );
    let runner = Arc::new(harness.runner());
    let (handle, signal) = cancellation_pair();

    let task = tokio::spawn({
        let runner = runner.clone();
        async move { runner.run_task(ticket("T-1"), signal).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("run_task returns promptly after cancellation")
        .unwrap()
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.escalation, Some(EscalationReason::Cancelled));
    assert_eq!(outcome.retries_used, 0);
    assert_eq!(outcome.dispatch_count, 1);
    assert_eq!(harness.worker.cancelled_sessions().await.len(), 1);
}

#[tokio::test]
async fn test_blocked_worker_notifies_human_once() {
    let harness = Harness::new(
        vec![vec![
            blocked("which error type should the parser return?"),
            blocked("which error type should the parser return?"),
            working(1, "continuing with ParseError"),
            ready("pub fn tokenize() -> Result<(), ParseError> { Ok(()) }"),
        ]],
        vec![Ok(true)],
        vec![Ok(ReviewVerdict::approved())],
    )
    .configure(|config| config.escalation.human_interrupt = true);

    let outcome = harness
        .runner()
        .run_task(ticket("T-1"), CancelSignal::never())
        .await
        .unwrap();

    assert!(outcome.is_done());
    assert_eq!(outcome.dispatch_count, 1);
    let requests = harness.interrupt.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, TicketId::new("T-1"));
    assert_eq!(
        requests[0].2.as_deref(),
        Some("which error type should the parser return?")
    );
}

#[tokio::test]
async fn test_blocked_worker_without_interrupt_is_retried() {
    let harness = Harness::new(
        vec![
            vec![blocked("need credentials")],
            healthy_session("pub fn tokenize() {}"),
        ],
        vec![Ok(true)],
        vec![Ok(ReviewVerdict::approved())],
    );

    let outcome = harness
        .runner()
        .run_task(ticket("T-1"), CancelSignal::never())
        .await
        .unwrap();

    assert!(outcome.is_done());
    assert_eq!(outcome.dispatch_count, 2);
    assert_eq!(outcome.failure_history[0].kind, FailureKind::WorkerFailed);
    assert!(harness.interrupt.requests().await.is_empty());
}

#[tokio::test]
async fn test_missing_patch_is_a_worker_failure() {
    let harness = Harness::new(
        vec![
            vec![ScriptStep::Report(PollReport::status(WorkerStatus::Completed))],
            healthy_session("pub fn tokenize() {}"),
        ],
        vec![Ok(true)],
        vec![Ok(ReviewVerdict::approved())],
    );

    let outcome = harness
        .runner()
        .run_task(ticket("T-1"), CancelSignal::never())
        .await
        .unwrap();

    assert!(outcome.is_done());
    assert!(matches!(
        outcome.failure_history[0].evidence,
        FailureEvidence::Worker {
            reason: WorkerFailureReason::MissingPatch
        }
    ));
}

#[tokio::test]
async fn test_lost_session_is_retried_as_worker_failure() {
    let harness = Harness::new(
        vec![
            vec![ScriptStep::Error(PortError::UnknownSession("scripted-1".into()))],
            healthy_session("pub fn tokenize() {}"),
        ],
        vec![Ok(true)],
        vec![Ok(ReviewVerdict::approved())],
    );

    let outcome = harness
        .runner()
        .run_task(ticket("T-1"), CancelSignal::never())
        .await
        .unwrap();

    assert!(outcome.is_done());
    assert_eq!(outcome.dispatch_count, 2);
    assert!(matches!(
        &outcome.failure_history[0].evidence,
        FailureEvidence::Worker {
            reason: WorkerFailureReason::SessionLost { session_id }
        } if session_id == "scripted-1"
    ));
}

#[tokio::test]
async fn test_unmet_dependency_is_rejected_before_dispatch() {
    let harness = Harness::new(
        vec![healthy_session("pub fn tokenize() {}")],
        vec![Ok(true)],
        vec![Ok(ReviewVerdict::approved())],
    );
    harness
        .backlog
        .set_status(TicketId::new("T-0"), TicketStatus::InProgress)
        .await;

    let err = harness
        .runner()
        .run_task(
            ticket("T-1").with_dependencies(vec![TicketId::new("T-0")]),
            CancelSignal::never(),
        )
        .await
        .unwrap_err();

    match err {
        LoopError::TicketNotReady { ticket, unmet } => {
            assert_eq!(ticket, TicketId::new("T-1"));
            assert_eq!(unmet, vec![TicketId::new("T-0")]);
        }
        other => panic!("expected TicketNotReady, got {other:?}"),
    }
    assert_eq!(harness.worker.session_count().await, 0);
}

#[tokio::test]
async fn test_done_dependency_allows_dispatch() {
    let harness = Harness::new(
        vec![healthy_session("pub fn tokenize() {}")],
        vec![Ok(true)],
        vec![Ok(ReviewVerdict::approved())],
    );
    harness
        .backlog
        .set_status(TicketId::new("T-0"), TicketStatus::Done)
        .await;

    let outcome = harness
        .runner()
        .run_task(
            ticket("T-1").with_dependencies(vec![TicketId::new("T-0")]),
            CancelSignal::never(),
        )
        .await
        .unwrap();
    assert!(outcome.is_done());
}

#[tokio::test]
async fn test_unreachable_worker_is_an_infrastructure_fault() {
    let harness = Harness::with_worker(
        ScriptedWorker::unreachable(),
        vec![Ok(true)],
        vec![Ok(ReviewVerdict::approved())],
    );

    let err = harness
        .runner()
        .run_task(ticket("T-1"), CancelSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LoopError::Infrastructure {
            collaborator: Collaborator::Worker,
            ..
        }
    ));
}

#[tokio::test]
async fn test_test_runner_outage_is_not_retried() {
    let harness = Harness::new(
        vec![healthy_session("pub fn tokenize() {}")],
        vec![Err(PortError::unreachable("test_runner", "sandbox gone"))],
        vec![Ok(ReviewVerdict::approved())],
    );

    let err = harness
        .runner()
        .run_task(ticket("T-1"), CancelSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LoopError::Infrastructure {
            collaborator: Collaborator::TestRunner,
            ..
        }
    ));
    assert_eq!(harness.worker.session_count().await, 1);
}

#[tokio::test]
async fn test_journal_records_each_transition() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    let harness = Harness::new(
        vec![
            healthy_session("pub fn tokenize() { todo!() }"),
            healthy_session("pub fn tokenize() {}"),
        ],
        vec![Ok(false), Ok(true)],
        vec![Ok(ReviewVerdict::approved())],
    );
    let runner = harness
        .runner()
        .with_journal(TransitionJournal::open(&path).await.unwrap());

    runner
        .run_task(ticket("T-1"), CancelSignal::never())
        .await
        .unwrap();

    let kinds: Vec<LoopEventKind> = read_events(&path)
        .unwrap()
        .into_iter()
        .map(|event| event.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            LoopEventKind::Dispatched,
            LoopEventKind::TestsFailed,
            LoopEventKind::RetryScheduled,
            LoopEventKind::Dispatched,
            LoopEventKind::Completed,
        ]
    );
}

#[tokio::test]
async fn test_concurrent_tickets_share_only_the_backlog() {
    let harness = Harness::new(
        vec![healthy_session("pub fn tokenize() {}")],
        vec![Ok(true)],
        vec![Ok(ReviewVerdict::approved())],
    );
    let runner = harness.runner();

    let (first, second) = tokio::join!(
        runner.run_task(ticket("T-1"), CancelSignal::never()),
        runner.run_task(ticket("T-2"), CancelSignal::never()),
    );

    let first = first.unwrap();
    let second = second.unwrap();
    assert!(first.is_done() && second.is_done());
    assert_eq!(first.dispatch_count, 1);
    assert_eq!(second.dispatch_count, 1);
    for id in ["T-1", "T-2"] {
        assert_eq!(
            harness.backlog.history(&TicketId::new(id)).await,
            vec![TicketStatus::InProgress, TicketStatus::Done]
        );
    }
}
