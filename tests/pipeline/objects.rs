use std::collections::BTreeMap;

use serde_json::json;

use continuity::ContinuityError;
use continuity::memory::{ObjectType, ShellWrite, SuccessPathPayload, SuccessPathWrite};

use super::pipeline_harness::{self, chat, scored};

fn success_path(name: &str, intent: &str, tags: &[&str]) -> SuccessPathWrite {
    SuccessPathWrite {
        path: SuccessPathPayload {
            name: name.into(),
            intent: intent.into(),
            required_slots: vec!["purpose".into()],
            slot_definitions: BTreeMap::from([("purpose".into(), "why we are doing this".into())]),
            procedure: "follow the checklist".into(),
            success_criteria: "checklist complete".into(),
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
        },
        confidence: Default::default(),
        validity: Default::default(),
    }
}

#[tokio::test]
async fn success_path_without_slot_definitions_is_rejected() {
    let orchestrator = pipeline_harness::orchestrator().await;
    let mut write = success_path("backup rotation", "rotate backups", &[]);
    write.path.slot_definitions.clear();

    let err = orchestrator.put_success_path("u1", write).await.unwrap_err();
    assert!(matches!(err, ContinuityError::Validation(ref msg) if msg.contains("purpose")));

    let listed = orchestrator.list_objects("u1", None, 50).await.unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn best_matching_success_path_is_surfaced_in_trace() {
    let orchestrator = pipeline_harness::orchestrator().await;
    orchestrator
        .put_success_path("u1", success_path("invoice export", "export invoices to csv", &["finance"]))
        .await
        .unwrap();
    let backup = orchestrator
        .put_success_path(
            "u1",
            success_path("backup rotation", "rotate weekly backup sets", &["backup", "storage"]),
        )
        .await
        .unwrap();

    let resp = orchestrator
        .handle_chat(&chat("u1", "what makes a weekly backup rotation reliable", "k1"))
        .await
        .unwrap();

    let best = scored(&resp).best_success_path.as_ref().unwrap();
    assert_eq!(best.object_id, backup.object_id);
    assert_eq!(best.name, "backup rotation");
    assert!(best.score_breakdown.intent_rel > 0.0);
}

#[tokio::test]
async fn paths_of_other_users_are_invisible() {
    let orchestrator = pipeline_harness::orchestrator().await;
    orchestrator
        .put_success_path("alice", success_path("backup rotation", "rotate weekly backup sets", &[]))
        .await
        .unwrap();

    let resp = orchestrator
        .handle_chat(&chat("bob", "what makes a weekly backup rotation reliable", "k1"))
        .await
        .unwrap();
    assert!(scored(&resp).best_success_path.is_none());
}

#[tokio::test]
async fn latest_shell_wins_and_listing_filters_by_type() {
    let orchestrator = pipeline_harness::orchestrator().await;

    let err = orchestrator.latest_shell("u1").await.unwrap_err();
    assert!(matches!(err, ContinuityError::NotFound { entity: "shell", .. }));

    let first: ShellWrite = serde_json::from_value(json!({
        "social_interface": {"tone": "formal"},
        "narratives": {"role": "ops lead"}
    }))
    .unwrap();
    orchestrator.put_shell("u1", first).await.unwrap();
    let second: ShellWrite = serde_json::from_value(json!({
        "social_interface": {"tone": "casual"}
    }))
    .unwrap();
    let newest = orchestrator.put_shell("u1", second).await.unwrap();
    orchestrator
        .put_success_path("u1", success_path("backup rotation", "rotate backups", &[]))
        .await
        .unwrap();

    let shell = orchestrator.latest_shell("u1").await.unwrap();
    assert_eq!(shell.object_id, newest.object_id);

    let shells = orchestrator
        .list_objects("u1", Some(ObjectType::Shell), 50)
        .await
        .unwrap();
    assert_eq!(shells.len(), 2);
    assert_eq!(shells[0].object_id, newest.object_id);
    assert!(shells.iter().all(|o| o.object_type() == ObjectType::Shell));

    let everything = orchestrator.list_objects("u1", None, 50).await.unwrap();
    assert_eq!(everything.len(), 3);
    let one = orchestrator.list_objects("u1", None, 1).await.unwrap();
    assert_eq!(one.len(), 1);
}

#[tokio::test]
async fn list_limit_is_bounded() {
    let orchestrator = pipeline_harness::orchestrator().await;
    for limit in [0, 201] {
        let err = orchestrator.list_objects("u1", None, limit).await.unwrap_err();
        assert!(matches!(err, ContinuityError::Validation(_)));
    }
    assert!(orchestrator.list_objects("u1", None, 200).await.is_ok());
}
