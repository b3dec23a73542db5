use continuity::ContinuityError;
use continuity::core::orchestrator::DecisionTrace;

use super::pipeline_harness::{self, chat, scored};

#[tokio::test]
async fn replay_returns_stored_response_without_new_writes() {
    let orchestrator = pipeline_harness::orchestrator().await;
    let req = chat("u1", "what makes a weekly backup rotation reliable", "k1");

    let first = orchestrator.handle_chat(&req).await.unwrap();
    let second = orchestrator.handle_chat(&req).await.unwrap();

    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    assert_eq!(first.response, second.response);
    assert_eq!(first.session_id, second.session_id);
    assert_eq!(first.trace.trace_id(), second.trace.trace_id());
    assert_eq!(scored(&first).decision_id, scored(&second).decision_id);

    let state = orchestrator.user_state("u1").await.unwrap();
    assert_eq!(state.update_count, 1);
    assert_eq!(pipeline_harness::stored_counts(&orchestrator, "u1").await, (6, 1));
}

#[tokio::test]
async fn clarify_first_is_replayed_too() {
    let orchestrator = pipeline_harness::orchestrator().await;
    let req = chat("u1", "please run the nightly cleanup", "k1");

    let first = orchestrator.handle_chat(&req).await.unwrap();
    let second = orchestrator.handle_chat(&req).await.unwrap();

    assert!(matches!(second.trace, DecisionTrace::ClarifyFirst(_)));
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    assert_eq!(first.trace.trace_id(), second.trace.trace_id());
    assert_eq!(first.session_id, second.session_id);
}

#[tokio::test]
async fn same_key_with_different_payload_conflicts() {
    let orchestrator = pipeline_harness::orchestrator().await;
    orchestrator
        .handle_chat(&chat("u1", "what makes a weekly backup rotation reliable", "k1"))
        .await
        .unwrap();

    let err = orchestrator
        .handle_chat(&chat("u1", "something else entirely", "k1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ContinuityError::IdempotencyConflict { ref key } if key == "k1"));
    assert!(err.is_client_error());

    let state = orchestrator.user_state("u1").await.unwrap();
    assert_eq!(state.update_count, 1);
}

#[tokio::test]
async fn changed_slots_also_conflict() {
    let orchestrator = pipeline_harness::orchestrator().await;
    let req = chat("u1", "please run the nightly cleanup", "k1");
    orchestrator.handle_chat(&req).await.unwrap();

    let mut changed = req.clone();
    changed.known_slots.insert("target".into(), "/tmp".into());
    let err = orchestrator.handle_chat(&changed).await.unwrap_err();
    assert!(matches!(err, ContinuityError::IdempotencyConflict { .. }));
}

#[tokio::test]
async fn keys_are_scoped_per_user() {
    let orchestrator = pipeline_harness::orchestrator().await;

    let alice = orchestrator
        .handle_chat(&chat("alice", "what makes a weekly backup rotation reliable", "k1"))
        .await
        .unwrap();
    let bob = orchestrator
        .handle_chat(&chat("bob", "a different question about rotation", "k1"))
        .await
        .unwrap();

    assert_ne!(scored(&alice).decision_id, scored(&bob).decision_id);
    assert_eq!(bob.user_state.user_id, "bob");
}

#[tokio::test]
async fn concurrent_duplicates_commit_once() {
    let orchestrator = pipeline_harness::shared(pipeline_harness::orchestrator().await);
    let req = chat("u1", "what makes a weekly backup rotation reliable", "k1");

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            let req = req.clone();
            tokio::spawn(async move { orchestrator.handle_chat(&req).await })
        })
        .collect();

    let mut decision_ids = Vec::new();
    for handle in handles {
        let resp = handle.await.unwrap().unwrap();
        decision_ids.push(scored(&resp).decision_id);
    }
    decision_ids.dedup();
    assert_eq!(decision_ids.len(), 1);

    let state = orchestrator.user_state("u1").await.unwrap();
    assert_eq!(state.update_count, 1);
}
