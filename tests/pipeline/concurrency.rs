use continuity::ContinuityError;

use super::pipeline_harness::{self, chat, scored};

#[tokio::test]
async fn concurrent_users_on_shared_pool_all_commit() {
    let dir = tempfile::TempDir::new().unwrap();
    let orchestrator = pipeline_harness::shared(pipeline_harness::file_orchestrator(&dir, 4).await);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                let user = format!("user-{i}");
                orchestrator
                    .handle_chat(&chat(&user, "such a waste of an afternoon", "k1"))
                    .await
            })
        })
        .collect();

    for handle in handles {
        let resp = handle.await.unwrap().unwrap();
        assert_eq!(resp.user_state.update_count, 1);
    }
    for i in 0..16 {
        let user = format!("user-{i}");
        assert_eq!(pipeline_harness::stored_counts(&orchestrator, &user).await, (6, 1));
    }
}

#[tokio::test]
async fn duplicate_keys_on_shared_pool_commit_once() {
    let dir = tempfile::TempDir::new().unwrap();
    let orchestrator = pipeline_harness::shared(pipeline_harness::file_orchestrator(&dir, 4).await);
    let req = chat("u1", "what makes a weekly backup rotation reliable", "k1");

    let handles: Vec<_> = (0..8)
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
    assert_eq!(pipeline_harness::stored_counts(&orchestrator, "u1").await, (6, 1));
}

#[tokio::test]
async fn concurrent_confirmations_on_shared_pool_succeed_once() {
    let dir = tempfile::TempDir::new().unwrap();
    let orchestrator = pipeline_harness::shared(pipeline_harness::file_orchestrator(&dir, 4).await);
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
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(ContinuityError::ConfirmationInvalid) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(ok, 1);
}
