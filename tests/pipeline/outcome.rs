use std::collections::BTreeMap;

use continuity::ContinuityError;
use continuity::core::outcome::OutcomeReport;
use continuity::core::state::Axis;

use super::pipeline_harness::{self, chat, scored};

fn report(actual: &[(Axis, f64)], cost: f64) -> OutcomeReport {
    OutcomeReport {
        actual_impact_vector: actual.iter().copied().collect::<BTreeMap<_, _>>(),
        actual_cost: cost,
        continuity_failure: false,
        failure_type: None,
        user_visible_cost: None,
        preventable: None,
    }
}

#[tokio::test]
async fn reconcile_records_l1_and_cost_error() {
    let orchestrator = pipeline_harness::orchestrator().await;
    // Keyword extraction: time -0.1, everything else 0.
    let resp = orchestrator
        .handle_chat(&chat("u1", "such a waste of an afternoon", "k1"))
        .await
        .unwrap();
    let trace = scored(&resp);
    assert_eq!(trace.outcome_status, "pending_actual_feedback");

    let record = orchestrator
        .report_outcome(
            trace.decision_id,
            "u1",
            &report(&[(Axis::Time, -0.2), (Axis::Energy, -0.1)], 0.5),
        )
        .await
        .unwrap();

    assert_eq!(record.outcome_id, trace.outcome_id);
    assert!((record.vector_error_l1.unwrap() - 0.2).abs() < 1e-9);
    let expected_cost_error = 0.5 - trace.continuity_cost;
    assert!((record.cost_error.unwrap() - expected_cost_error).abs() < 1e-9);
    assert!(record.is_reconciled());
    assert_eq!(record.actual_cost, Some(0.5));
}

#[tokio::test]
async fn second_reconcile_is_rejected() {
    let orchestrator = pipeline_harness::orchestrator().await;
    let resp = orchestrator
        .handle_chat(&chat("u1", "such a waste of an afternoon", "k1"))
        .await
        .unwrap();
    let decision_id = scored(&resp).decision_id;

    orchestrator
        .report_outcome(decision_id, "u1", &report(&[(Axis::Time, -0.1)], 0.1))
        .await
        .unwrap();
    let err = orchestrator
        .report_outcome(decision_id, "u1", &report(&[(Axis::Time, -0.9)], 0.9))
        .await
        .unwrap_err();
    assert!(
        matches!(err, ContinuityError::OutcomeAlreadyReconciled { decision_id: id } if id == decision_id)
    );
}

#[tokio::test]
async fn unknown_or_foreign_decision_is_not_found() {
    let orchestrator = pipeline_harness::orchestrator().await;
    let resp = orchestrator
        .handle_chat(&chat("u1", "such a waste of an afternoon", "k1"))
        .await
        .unwrap();
    let decision_id = scored(&resp).decision_id;

    for (id, user) in [(decision_id + 1, "u1"), (decision_id, "someone-else")] {
        let err = orchestrator
            .report_outcome(id, user, &report(&[], 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ContinuityError::NotFound { entity: "outcome", .. }));
    }
}

#[tokio::test]
async fn reported_failure_feeds_later_retrieval() {
    let orchestrator = pipeline_harness::orchestrator().await;
    let resp = orchestrator
        .handle_chat(&chat("u1", "such a waste of an afternoon", "k1"))
        .await
        .unwrap();

    let mut failed = report(&[(Axis::Reliability, -0.5)], 0.6);
    failed.continuity_failure = true;
    failed.failure_type = Some("context_loss".into());
    orchestrator
        .report_outcome(scored(&resp).decision_id, "u1", &failed)
        .await
        .unwrap();

    let next = orchestrator
        .handle_chat(&chat("u1", "you forgot the context again, I had to repeat it", "k2"))
        .await
        .unwrap();
    let trace = scored(&next);
    assert!(
        trace
            .matched_failure_types
            .iter()
            .any(|m| m.failure_type == "context_loss")
    );
    assert!(trace.feature_penalty > 0.0);
}

#[tokio::test]
async fn non_finite_report_is_rejected() {
    let orchestrator = pipeline_harness::orchestrator().await;
    let resp = orchestrator
        .handle_chat(&chat("u1", "such a waste of an afternoon", "k1"))
        .await
        .unwrap();

    let err = orchestrator
        .report_outcome(scored(&resp).decision_id, "u1", &report(&[(Axis::Time, f64::INFINITY)], 0.1))
        .await
        .unwrap_err();
    assert!(matches!(err, ContinuityError::Validation(_)));
}
