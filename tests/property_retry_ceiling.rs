use microloop::domain::models::{
    EngineeringState, EscalationReason, FailureEvidence, LoopPolicyConfig, ReviewStatus,
    ReviewVerdict, SemanticHealthMetric, SessionId, Severity, TestEvidence, TestOutcome, Ticket,
    Violation, WorkerFailureReason, WorkerSession,
};
use microloop::services::{apply_stability_protocol, FeedbackDecision, FeedbackLoop, GateDecision};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

fn evidence_for(choice: u8) -> FailureEvidence {
    match choice % 4 {
        0 => FailureEvidence::Tests {
            outcome: TestOutcome::failing(
                "digest",
                TestEvidence {
                    failing_tests: vec!["tests::it_parses".to_string()],
                    output_excerpt: "assertion `left == right` failed".to_string(),
                    exit_code: Some(101),
                    passed_count: 3,
                    failed_count: 1,
                },
            ),
        },
        1 => FailureEvidence::Review {
            violations: Vec::new(),
        },
        2 => FailureEvidence::Degenerate {
            metric: SemanticHealthMetric::insufficient(3, 3, 7.0),
        },
        _ => FailureEvidence::Worker {
            reason: WorkerFailureReason::Reported { message: None },
        },
    }
}

/// Feed `failures` through the loop until it escalates, dispatching a fresh
/// session before each one.
fn drive(
    policy: &LoopPolicyConfig,
    failures: &[u8],
) -> Result<(EngineeringState, Option<EscalationReason>), TestCaseError> {
    let feedback = FeedbackLoop::new(policy).map_err(|e| TestCaseError::fail(e.to_string()))?;
    let mut state = EngineeringState::new(Ticket::new("T-1", "t", "d"));
    let mut inherited = 0;

    for &choice in failures {
        let attempt = state.dispatch_count() + 1;
        state
            .begin_session(WorkerSession::new(
                SessionId::new(format!("s-{attempt}")),
                attempt,
                inherited,
            ))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        match feedback.process(&mut state, evidence_for(choice)) {
            FeedbackDecision::Retry {
                instructions,
                inherited_architect_attempts,
            } => {
                prop_assert!(!instructions.is_empty());
                inherited = inherited_architect_attempts;
            }
            FeedbackDecision::Escalate(reason) => return Ok((state, Some(reason))),
        }
    }
    Ok((state, None))
}

/// One gate outcome for an attempt that reached review or failed before it.
#[derive(Debug, Clone)]
enum Step {
    Review(ReviewStatus),
    TestFailure,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        1 => Just(Step::Review(ReviewStatus::Approved)),
        1 => Just(Step::Review(ReviewStatus::ApprovedWithTechDebt)),
        3 => Just(Step::Review(ReviewStatus::Rejected)),
        2 => Just(Step::TestFailure),
    ]
}

fn verdict_for(status: ReviewStatus) -> ReviewVerdict {
    let violations = vec![Violation::new("layering", Severity::Major, "domain imports adapter")];
    match status {
        ReviewStatus::Approved => ReviewVerdict::approved(),
        ReviewStatus::ApprovedWithTechDebt => ReviewVerdict::approved_with_tech_debt(violations),
        ReviewStatus::Rejected => ReviewVerdict::rejected(violations),
    }
}

proptest! {
    /// Property: the retry counter never exceeds the ceiling
    ///
    /// Whatever mix of failures arrives, retries are only charged while the
    /// projected total stays within the ceiling, and the loop escalates before
    /// dispatching more than `ceiling + 1` sessions.
    #[test]
    fn prop_retries_never_exceed_ceiling(
        ceiling in 0u32..8,
        tunneling_cost in 1u32..4,
        failures in prop::collection::vec(any::<u8>(), 1..40)
    ) {
        let policy = LoopPolicyConfig {
            retry_ceiling: ceiling,
            tunneling_retry_cost: tunneling_cost,
            ..LoopPolicyConfig::default()
        };

        let (state, escalation) = drive(&policy, &failures)?;

        prop_assert!(state.retries_used() <= ceiling);
        prop_assert!(state.dispatch_count() <= ceiling + 1);
        prop_assert_eq!(state.failure_history().len(), state.dispatch_count() as usize);
        if escalation.is_none() {
            prop_assert_eq!(state.dispatch_count() as usize, failures.len());
        }
    }

    /// Property: an unbounded failure stream always escalates
    #[test]
    fn prop_endless_failures_escalate(
        ceiling in 0u32..8,
        choice in any::<u8>()
    ) {
        let policy = LoopPolicyConfig {
            retry_ceiling: ceiling,
            ..LoopPolicyConfig::default()
        };
        let failures = vec![choice; (ceiling as usize + 1) * 2];

        let (_, escalation) = drive(&policy, &failures)?;

        prop_assert_eq!(escalation, Some(EscalationReason::RetriesExhausted));
    }

    /// Property: cancellation escalates immediately and is never charged
    #[test]
    fn prop_cancellation_is_free(
        ceiling in 0u32..8,
        earlier in prop::collection::vec(any::<u8>(), 0..4)
    ) {
        let policy = LoopPolicyConfig {
            retry_ceiling: ceiling,
            ..LoopPolicyConfig::default()
        };
        let (mut state, escalation) = drive(&policy, &earlier)?;
        prop_assume!(escalation.is_none());
        let before = state.retries_used();

        let feedback = FeedbackLoop::new(&policy).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let attempt = state.dispatch_count() + 1;
        state
            .begin_session(WorkerSession::new(SessionId::new("cancelled"), attempt, 0))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let decision = feedback.process(
            &mut state,
            FailureEvidence::Worker { reason: WorkerFailureReason::Cancelled },
        );

        prop_assert_eq!(decision, FeedbackDecision::Escalate(EscalationReason::Cancelled));
        prop_assert_eq!(state.retries_used(), before);
    }

    /// Property: the architect counter never exceeds one, and a rejection
    /// that directly follows another rejection is accepted as tech debt
    #[test]
    fn prop_second_rejection_falls_back_to_tech_debt(
        steps in prop::collection::vec(step(), 1..30)
    ) {
        let policy = LoopPolicyConfig {
            retry_ceiling: 64,
            ..LoopPolicyConfig::default()
        };
        let feedback = FeedbackLoop::new(&policy).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let mut state = EngineeringState::new(Ticket::new("T-1", "t", "d"));
        let mut inherited = 0;
        let mut previous_was_rejection = false;

        for step in steps {
            let attempt = state.dispatch_count() + 1;
            state
                .begin_session(WorkerSession::new(
                    SessionId::new(format!("s-{attempt}")),
                    attempt,
                    inherited,
                ))
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let session = state
                .session_mut()
                .ok_or_else(|| TestCaseError::fail("no active session"))?;
            prop_assert!(session.architect_refactor_attempts <= 1);

            let evidence = match step {
                Step::TestFailure => FailureEvidence::Tests {
                    outcome: TestOutcome::failing("digest", TestEvidence::default()),
                },
                Step::Review(status) => {
                    match apply_stability_protocol(session, verdict_for(status)) {
                        GateDecision::Accepted { verdict, fallback } => {
                            prop_assert!(session.architect_refactor_attempts <= 1);
                            if status == ReviewStatus::Rejected {
                                prop_assert!(previous_was_rejection);
                                prop_assert!(fallback);
                                prop_assert_eq!(verdict.status, ReviewStatus::ApprovedWithTechDebt);
                                let tag = verdict.tech_debt_tag;
                                prop_assert!(tag.is_some_and(|t| !t.note.is_empty()));
                            } else {
                                prop_assert!(!fallback);
                            }
                            return Ok(());
                        }
                        GateDecision::Rejected { violations } => {
                            prop_assert_eq!(status, ReviewStatus::Rejected);
                            prop_assert!(!previous_was_rejection);
                            prop_assert_eq!(session.architect_refactor_attempts, 1);
                            FailureEvidence::Review { violations }
                        }
                    }
                }
            };

            previous_was_rejection = matches!(evidence, FailureEvidence::Review { .. });
            match feedback.process(&mut state, evidence) {
                FeedbackDecision::Retry { inherited_architect_attempts, .. } => {
                    prop_assert!(inherited_architect_attempts <= 1);
                    prop_assert_eq!(inherited_architect_attempts == 1, previous_was_rejection);
                    inherited = inherited_architect_attempts;
                }
                FeedbackDecision::Escalate(reason) => {
                    prop_assert_eq!(reason, EscalationReason::RetriesExhausted);
                    return Ok(());
                }
            }
        }
    }
}
