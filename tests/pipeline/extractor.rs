use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use continuity::config::{Config, ExtractorProvider};
use continuity::core::impact::{ExtractionSource, ImpactExtractor, LlmImpactExtractor};
use continuity::core::state::{Axis, UserState};
use continuity::{Orchestrator, Store};

use super::pipeline_harness::{chat, scored};

fn config_for(server: &MockServer) -> Config {
    let mut config = super::pipeline_harness::config();
    config.extractor.provider = ExtractorProvider::Openai;
    config.extractor.base_url = format!("{}/v1", server.uri());
    config.extractor.api_key = Some("test-key".into());
    config.extractor.timeout_secs = 5;
    config
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    })
}

async fn orchestrator_for(server: &MockServer) -> Orchestrator {
    let store = Store::in_memory().await.unwrap();
    Orchestrator::new(store, config_for(server))
}

#[tokio::test]
async fn llm_extractor_parses_fenced_json() {
    let server = MockServer::start().await;
    let impact = json!({
        "schema_version": "event_impact_v2.1",
        "event_summary": "lost a day of work",
        "event_class": "setback",
        "impact_vector": {"delta_time": -0.6, "delta_energy": -0.3},
        "axis_confidence": {"money": 0.5, "time": 0.9, "energy": 0.8, "asset": 0.5, "reliability": 0.5, "identity": 0.5},
        "missing_axes": [],
        "irreversible": false,
        "system_caused": true,
        "analysis_confidence": 0.85
    });
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(&format!("```json\n{impact}\n```"))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let extractor = LlmImpactExtractor::new(&config_for(&server).extractor);
    let result = extractor
        .extract("lost a day of work", &UserState::new("u1"))
        .await
        .unwrap();

    assert!((result.impact_vector[Axis::Time] + 0.6).abs() < f64::EPSILON);
    assert!((result.impact_vector[Axis::Energy] + 0.3).abs() < f64::EPSILON);
    assert!(result.impact_vector[Axis::Money].abs() < f64::EPSILON);
    assert!(result.system_caused);
    server.verify().await;
}

#[tokio::test]
async fn server_error_falls_back_to_keywords() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let orchestrator = orchestrator_for(&server).await;

    let resp = orchestrator
        .handle_chat(&chat("u1", "such a waste of an afternoon", "k1"))
        .await
        .unwrap();

    let trace = scored(&resp);
    assert_eq!(trace.extractor.source, ExtractionSource::Fallback);
    assert_eq!(trace.extractor.fallback_reason.as_deref(), Some("llm_unavailable:http_500"));
    assert!(resp.user_state.value(Axis::Time) < 0.5);
}

#[tokio::test]
async fn prose_without_json_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion("I cannot help with that.")),
        )
        .mount(&server)
        .await;
    let orchestrator = orchestrator_for(&server).await;

    let resp = orchestrator
        .handle_chat(&chat("u1", "such a waste of an afternoon", "k1"))
        .await
        .unwrap();

    let reason = scored(&resp).extractor.fallback_reason.clone().unwrap();
    assert!(reason.starts_with("llm_no_json"), "{reason}");
}

#[tokio::test]
async fn json_of_wrong_shape_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion(r#"{"verdict": "bad day"}"#)),
        )
        .mount(&server)
        .await;
    let orchestrator = orchestrator_for(&server).await;

    let resp = orchestrator
        .handle_chat(&chat("u1", "such a waste of an afternoon", "k1"))
        .await
        .unwrap();

    let reason = scored(&resp).extractor.fallback_reason.clone().unwrap();
    assert!(reason.starts_with("llm_parse_failed"), "{reason}");
}

#[tokio::test]
async fn malformed_body_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;
    let orchestrator = orchestrator_for(&server).await;

    let resp = orchestrator
        .handle_chat(&chat("u1", "such a waste of an afternoon", "k1"))
        .await
        .unwrap();

    let trace = scored(&resp);
    assert_eq!(trace.extractor.source, ExtractionSource::Fallback);
    assert!(
        trace
            .extractor
            .fallback_reason
            .as_deref()
            .is_some_and(|r| r.starts_with("llm_no_json"))
    );
}
