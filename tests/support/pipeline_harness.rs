#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;

use continuity::config::{Config, ExtractorProvider, RealityFirstMode};
use continuity::core::impact::{EventImpactResult, ImpactExtractor};
use continuity::core::orchestrator::{DecisionTrace, ScoredTrace};
use continuity::core::state::UserState;
use continuity::error::ExtractorError;
use continuity::store::Repository;
use continuity::{ChatRequest, ChatResponse, Orchestrator, Store};

/// Irreversible asset loss caused by the assistant: lands in layer 4.
pub const DATA_LOSS_MESSAGE: &str = "系统把生产数据删库了";

pub fn config() -> Config {
    let mut config = Config::default();
    config.extractor.provider = ExtractorProvider::None;
    config.reality_first.mode = RealityFirstMode::LowIntervention;
    config
}

pub async fn orchestrator() -> Orchestrator {
    orchestrator_with(config()).await
}

pub async fn orchestrator_with(config: Config) -> Orchestrator {
    let store = Store::in_memory().await.expect("in-memory store");
    Orchestrator::new(store, config)
}

/// File-backed WAL database with a real multi-connection pool.
pub async fn file_orchestrator(dir: &tempfile::TempDir, max_connections: u32) -> Orchestrator {
    let store = Store::open(&dir.path().join("continuity.db"), max_connections)
        .await
        .expect("file store");
    Orchestrator::new(store, config())
}

/// Stored `(state evidence rows, memory entries)` for a user.
pub async fn stored_counts(orchestrator: &Orchestrator, user: &str) -> (i64, i64) {
    let mut conn = orchestrator.store().pool().acquire().await.expect("connection");
    let mut repo = Repository::new(&mut conn);
    let evidence = repo.count_state_evidence(user).await.expect("evidence count");
    let entries = repo.count_memory_entries(user).await.expect("entry count");
    (evidence, entries)
}

pub async fn orchestrator_with_extractor(
    config: Config,
    extractor: Box<dyn ImpactExtractor>,
) -> Orchestrator {
    let store = Store::in_memory().await.expect("in-memory store");
    Orchestrator::with_extractor(store, config, Some(extractor))
}

pub fn chat(user: &str, message: &str, key: &str) -> ChatRequest {
    ChatRequest::new(user, message, key)
}

pub fn scored(resp: &ChatResponse) -> &ScoredTrace {
    match &resp.trace {
        DecisionTrace::Scored(trace) => trace,
        DecisionTrace::ClarifyFirst(_) => panic!("expected a scored trace, got clarify-first"),
    }
}

/// Record one layer-4 event, then send a near-identical one that hits the
/// gate. Returns the gated response.
pub async fn gated_response(orchestrator: &Orchestrator, user: &str) -> ChatResponse {
    let seed = orchestrator
        .handle_chat(&chat(user, DATA_LOSS_MESSAGE, "seed-l4"))
        .await
        .expect("seed chat");
    assert_eq!(scored(&seed).memory_layer, 4, "seed event must land in layer 4");

    orchestrator
        .handle_chat(&chat(user, DATA_LOSS_MESSAGE, "gated"))
        .await
        .expect("gated chat")
}

pub fn shared(orchestrator: Orchestrator) -> Arc<Orchestrator> {
    Arc::new(orchestrator)
}

/// Extractor that always returns the same impact.
pub struct FixedExtractor(pub EventImpactResult);

#[async_trait]
impl ImpactExtractor for FixedExtractor {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn extract(
        &self,
        _message: &str,
        _state: &UserState,
    ) -> Result<EventImpactResult, ExtractorError> {
        Ok(self.0.clone())
    }
}

/// Extractor that never answers within any reasonable bound.
pub struct StalledExtractor;

#[async_trait]
impl ImpactExtractor for StalledExtractor {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn extract(
        &self,
        _message: &str,
        _state: &UserState,
    ) -> Result<EventImpactResult, ExtractorError> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Err(ExtractorError::Unavailable("unreachable".into()))
    }
}
