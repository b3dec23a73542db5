use std::time::Instant;

use continuity::ContinuityError;
use continuity::config::RealityFirstMode;
use continuity::core::impact::{EventImpactResult, ExtractionSource, ImpactVector};
use continuity::core::intake::TaskType;
use continuity::core::orchestrator::{DecisionTrace, Intervention};
use continuity::core::scoring::{ActionKind, DecisionPath};
use continuity::core::state::Axis;

use super::pipeline_harness::{
    self, DATA_LOSS_MESSAGE, FixedExtractor, StalledExtractor, chat, scored,
};

#[tokio::test]
async fn neutral_message_is_scored_with_keyword_fallback() {
    let orchestrator = pipeline_harness::orchestrator().await;

    let resp = orchestrator
        .handle_chat(&chat("u1", "what makes a weekly backup rotation reliable", "k1"))
        .await
        .unwrap();

    let trace = scored(&resp);
    assert_eq!(trace.path, DecisionPath::Normal);
    assert_eq!(trace.task_type, TaskType::ConceptExploration);
    assert_eq!(trace.memory_layer, 1);
    assert_eq!(trace.extractor.source, ExtractionSource::Fallback);
    assert_eq!(
        trace.extractor.fallback_reason.as_deref(),
        Some("llm_unavailable:no_provider_or_key")
    );
    assert!(!trace.high_risk_confirmation.required);
    assert!(trace.high_risk_confirmation.confirm_token.is_none());
    assert!(resp.decision.is_some());
    assert!(resp.asked_questions.is_empty());

    assert_eq!(resp.user_state.update_count, 1);
    let stored = orchestrator.user_state("u1").await.unwrap();
    assert_eq!(stored.update_count, 1);

    let decision = orchestrator.decision(trace.decision_id, "u1").await.unwrap();
    assert_eq!(decision.trace_id, resp.trace.trace_id());
    assert_eq!(decision.selected_action.name, trace.selected_action);
    assert!(!decision.selected_action.confirmed);
}

#[tokio::test]
async fn execution_without_slots_asks_first_and_decides_nothing() {
    let orchestrator = pipeline_harness::orchestrator().await;

    let resp = orchestrator
        .handle_chat(&chat("u1", "please run the nightly cleanup", "k1"))
        .await
        .unwrap();

    let DecisionTrace::ClarifyFirst(trace) = &resp.trace else {
        panic!("expected clarify-first");
    };
    assert_eq!(trace.task_type, TaskType::Execution);
    assert_eq!(
        trace.missing_slots,
        vec!["environment", "target", "success_criteria"]
    );
    assert_eq!(resp.asked_questions.len(), 3);
    assert!(resp.decision.is_none());
    assert_eq!(resp.user_state.update_count, 0);

    let err = orchestrator.decision(1, "u1").await.unwrap_err();
    assert!(matches!(err, ContinuityError::NotFound { entity: "decision", .. }));
}

#[tokio::test]
async fn filled_slots_let_execution_through() {
    let orchestrator = pipeline_harness::orchestrator().await;
    let mut req = chat("u1", "please run the nightly cleanup", "k1");
    req.known_slots = [
        ("environment", "linux, sudo"),
        ("target", "/var/cache"),
        ("success_criteria", "disk usage under 70%"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let resp = orchestrator.handle_chat(&req).await.unwrap();
    assert_eq!(scored(&resp).task_type, TaskType::Execution);
}

#[tokio::test]
async fn blank_slot_values_still_count_as_missing() {
    let orchestrator = pipeline_harness::orchestrator().await;
    let mut req = chat("u1", "please run the nightly cleanup", "k1");
    req.known_slots.insert("target".into(), "   ".into());

    let resp = orchestrator.handle_chat(&req).await.unwrap();
    let DecisionTrace::ClarifyFirst(trace) = &resp.trace else {
        panic!("expected clarify-first");
    };
    assert!(trace.missing_slots.contains(&"target".to_string()));
}

#[tokio::test]
async fn shell_bias_adds_reality_question_to_clarify_first() {
    let orchestrator = pipeline_harness::orchestrator().await;
    let mut req = chat("u1", "我们一直这样做，要不要继续执行这个清理？", "k1");
    req.known_slots.insert("target".into(), "/var/cache".into());

    let resp = orchestrator.handle_chat(&req).await.unwrap();
    let DecisionTrace::ClarifyFirst(trace) = &resp.trace else {
        panic!("expected clarify-first");
    };
    assert!(trace.reality_first.shell_bias_hit);
    assert_eq!(trace.reality_first.intervention, Intervention::Hint);
    assert_eq!(resp.asked_questions.len(), 3);
    assert_eq!(
        resp.asked_questions.last().map(String::as_str),
        trace.reality_first.question.as_deref()
    );
}

#[tokio::test]
async fn reality_first_off_records_hit_without_intervening() {
    let mut config = pipeline_harness::config();
    config.reality_first.mode = RealityFirstMode::Off;
    let orchestrator = pipeline_harness::orchestrator_with(config).await;
    let mut req = chat("u1", "我们一直这样做，要不要继续执行这个清理？", "k1");
    req.known_slots.insert("target".into(), "/var/cache".into());

    let resp = orchestrator.handle_chat(&req).await.unwrap();
    let DecisionTrace::ClarifyFirst(trace) = &resp.trace else {
        panic!("expected clarify-first");
    };
    assert!(trace.reality_first.shell_bias_hit);
    assert_eq!(trace.reality_first.intervention, Intervention::None);
    assert_eq!(resp.asked_questions.len(), 2);
}

#[tokio::test]
async fn shell_bias_on_exploration_is_traced_but_not_hinted() {
    let orchestrator = pipeline_harness::orchestrator().await;

    let resp = orchestrator
        .handle_chat(&chat("u1", "we always do it this way, should we keep it?", "k1"))
        .await
        .unwrap();

    let trace = scored(&resp);
    assert!(trace.reality_first.shell_bias_hit);
    assert_eq!(trace.reality_first.intervention, Intervention::None);
    assert!(trace.reality_first.question.is_none());
}

#[tokio::test]
async fn repeated_layer4_event_is_gated() {
    let orchestrator = pipeline_harness::orchestrator().await;

    let resp = pipeline_harness::gated_response(&orchestrator, "u1").await;

    let trace = scored(&resp);
    assert_eq!(trace.path, DecisionPath::Gated);
    assert_eq!(trace.selected_action, ActionKind::ConfirmHighRisk);
    assert!(trace.l4_gate.hit);
    let top = trace.l4_gate.top.as_ref().unwrap();
    assert!(top.similarity >= 0.85);

    let score = resp.decision.unwrap();
    assert!((score.score + 999.0).abs() < f64::EPSILON);

    let confirmation = &trace.high_risk_confirmation;
    assert!(confirmation.required);
    assert!(confirmation.confirmation_id.is_some());
    assert!(confirmation.expires_at.is_some());
    assert!(resp.confirm_token().unwrap().starts_with("hrc_"));
    assert!(resp.response.contains(&trace.decision_id.to_string()));
}

#[tokio::test]
async fn first_layer4_event_is_not_gated_by_itself() {
    let orchestrator = pipeline_harness::orchestrator().await;

    let resp = orchestrator
        .handle_chat(&chat("u1", DATA_LOSS_MESSAGE, "k1"))
        .await
        .unwrap();

    let trace = scored(&resp);
    assert_eq!(trace.memory_layer, 4);
    assert!(!trace.l4_gate.hit);
    assert_eq!(trace.path, DecisionPath::Normal);
}

#[tokio::test]
async fn layer4_history_of_another_user_does_not_gate() {
    let orchestrator = pipeline_harness::orchestrator().await;
    orchestrator
        .handle_chat(&chat("alice", DATA_LOSS_MESSAGE, "k1"))
        .await
        .unwrap();

    let resp = orchestrator
        .handle_chat(&chat("bob", DATA_LOSS_MESSAGE, "k1"))
        .await
        .unwrap();
    assert!(!scored(&resp).l4_gate.hit);
}

#[tokio::test]
async fn primary_extractor_result_is_used_when_it_answers() {
    let mut impact = EventImpactResult::neutral("lost an afternoon");
    impact.impact_vector = ImpactVector::zero();
    impact.impact_vector[Axis::Time] = -0.4;
    impact.axis_confidence[Axis::Time] = 0.9;
    impact.analysis_confidence = 0.9;
    let orchestrator = pipeline_harness::orchestrator_with_extractor(
        pipeline_harness::config(),
        Box::new(FixedExtractor(impact)),
    )
    .await;

    let resp = orchestrator
        .handle_chat(&chat("u1", "lost an afternoon on this", "k1"))
        .await
        .unwrap();

    let trace = scored(&resp);
    assert_eq!(trace.extractor.source, ExtractionSource::Llm);
    assert!(trace.extractor.fallback_reason.is_none());
    assert!(resp.user_state.value(Axis::Time) < 0.5);
}

#[tokio::test]
async fn stalled_extractor_falls_back_within_timeout() {
    let mut config = pipeline_harness::config();
    config.extractor.timeout_secs = 1;
    let orchestrator =
        pipeline_harness::orchestrator_with_extractor(config, Box::new(StalledExtractor)).await;

    let started = Instant::now();
    let resp = orchestrator
        .handle_chat(&chat("u1", "such a waste of an afternoon", "k1"))
        .await
        .unwrap();

    assert!(started.elapsed().as_secs() < 10);
    let trace = scored(&resp);
    assert_eq!(trace.extractor.source, ExtractionSource::Fallback);
    assert_eq!(trace.extractor.fallback_reason.as_deref(), Some("llm_timeout:1s"));
}

#[tokio::test]
async fn blank_fields_are_rejected_before_any_write() {
    let orchestrator = pipeline_harness::orchestrator().await;

    let err = orchestrator
        .handle_chat(&chat("u1", "   ", "k1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ContinuityError::Validation(_)));

    let err = orchestrator.user_state(" ").await.unwrap_err();
    assert!(matches!(err, ContinuityError::Validation(_)));
}

#[tokio::test]
async fn reading_state_of_unknown_user_returns_defaults() {
    let orchestrator = pipeline_harness::orchestrator().await;

    let state = orchestrator.user_state("ghost").await.unwrap();
    assert_eq!(state.update_count, 0);
    assert!(state.last_updated.is_none());
    assert!((state.value(Axis::Reliability) - 0.8).abs() < f64::EPSILON);
}
