use chrono::{Duration, Utc};

use continuity::ContinuityError;
use continuity::core::confirmation;
use continuity::core::scoring::ActionKind;

use super::pipeline_harness::{self, scored};

#[tokio::test]
async fn token_confirms_decision_exactly_once() {
    let orchestrator = pipeline_harness::orchestrator().await;
    let resp = pipeline_harness::gated_response(&orchestrator, "u1").await;
    let decision_id = scored(&resp).decision_id;
    let token = resp.confirm_token().unwrap().to_string();

    let receipt = orchestrator
        .confirm_high_risk(decision_id, "u1", &token)
        .await
        .unwrap();
    assert!(receipt.ok && receipt.confirmed);
    assert_eq!(receipt.decision_id, decision_id);
    assert_eq!(
        Some(receipt.confirmation_id),
        scored(&resp).high_risk_confirmation.confirmation_id
    );

    let err = orchestrator
        .confirm_high_risk(decision_id, "u1", &token)
        .await
        .unwrap_err();
    assert!(matches!(err, ContinuityError::ConfirmationInvalid));

    let record = orchestrator.decision(decision_id, "u1").await.unwrap();
    assert_eq!(record.selected_action.name, ActionKind::ConfirmHighRisk);
    assert!(record.selected_action.confirmed);
    assert_eq!(record.selected_action.confirmed_by.as_deref(), Some("u1"));
    assert_eq!(
        record.selected_action.confirmation_id,
        Some(receipt.confirmation_id)
    );
}

#[tokio::test]
async fn mismatches_are_rejected_uniformly() {
    let orchestrator = pipeline_harness::orchestrator().await;
    let resp = pipeline_harness::gated_response(&orchestrator, "u1").await;
    let decision_id = scored(&resp).decision_id;
    let token = resp.confirm_token().unwrap().to_string();

    let attempts = [
        (decision_id, "u1", "hrc_wrong"),
        (decision_id, "intruder", token.as_str()),
        (decision_id + 100, "u1", token.as_str()),
    ];
    for (id, user, tok) in attempts {
        let err = orchestrator.confirm_high_risk(id, user, tok).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid or expired confirmation token");
    }

    // Failed attempts leave the token usable.
    orchestrator
        .confirm_high_risk(decision_id, "u1", &token)
        .await
        .unwrap();
}

#[tokio::test]
async fn replayed_gated_response_omits_token() {
    let orchestrator = pipeline_harness::orchestrator().await;
    let live = pipeline_harness::gated_response(&orchestrator, "u1").await;

    let replay = orchestrator
        .handle_chat(&pipeline_harness::chat(
            "u1",
            pipeline_harness::DATA_LOSS_MESSAGE,
            "gated",
        ))
        .await
        .unwrap();

    assert!(live.confirm_token().is_some());
    assert!(replay.confirm_token().is_none());
    let confirmation = &scored(&replay).high_risk_confirmation;
    assert!(confirmation.required);
    assert_eq!(
        confirmation.confirmation_id,
        scored(&live).high_risk_confirmation.confirmation_id
    );
    assert_eq!(scored(&replay).decision_id, scored(&live).decision_id);
    assert_eq!(
        serde_json::to_string(&replay).unwrap(),
        serde_json::to_string(&live.redacted()).unwrap()
    );
}

#[tokio::test]
async fn concurrent_confirmations_succeed_once() {
    let orchestrator = pipeline_harness::shared(pipeline_harness::orchestrator().await);
    let resp = pipeline_harness::gated_response(&orchestrator, "u1").await;
    let decision_id = scored(&resp).decision_id;
    let token = resp.confirm_token().unwrap().to_string();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            let token = token.clone();
            tokio::spawn(async move {
                orchestrator
                    .confirm_high_risk(decision_id, "u1", &token)
                    .await
            })
        })
        .collect();

    let mut ok = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(ContinuityError::ConfirmationInvalid) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(rejected, 7);
}

#[tokio::test]
async fn zero_ttl_token_is_born_expired() {
    let mut config = pipeline_harness::config();
    config.confirmation.token_ttl_minutes = 0;
    let orchestrator = pipeline_harness::orchestrator_with(config).await;
    let resp = pipeline_harness::gated_response(&orchestrator, "u1").await;
    let token = resp.confirm_token().unwrap().to_string();

    let err = orchestrator
        .confirm_high_risk(scored(&resp).decision_id, "u1", &token)
        .await
        .unwrap_err();
    assert!(matches!(err, ContinuityError::ConfirmationInvalid));
}

#[tokio::test]
async fn token_expires_after_ttl() {
    let orchestrator = pipeline_harness::orchestrator().await;
    let resp = pipeline_harness::gated_response(&orchestrator, "u1").await;
    let decision_id = scored(&resp).decision_id;
    let token = resp.confirm_token().unwrap().to_string();

    let later = Utc::now() + Duration::minutes(31);
    let err = confirmation::consume(orchestrator.store(), decision_id, "u1", &token, later)
        .await
        .unwrap_err();
    assert!(matches!(err, ContinuityError::ConfirmationInvalid));

    let record = orchestrator.decision(decision_id, "u1").await.unwrap();
    assert!(!record.selected_action.confirmed);
}
