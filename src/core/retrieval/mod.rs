//! Read-only memory retrieval: ranked success paths, similar past entries,
//! the layer-4 safety gate and failure-feature penalties.
//!
//! [`retrieve`] only fetches; every decision is made by the pure
//! [`assemble`] so it can be tested without a database.

mod features;
mod ranking;

pub use features::{
    FailureFeature, MAX_FEATURE_PENALTY, MatchedFailure, extract_failure_features,
    feature_penalty, match_failures, recency_factor,
};
pub use ranking::{RankedSuccessPath, ScoreBreakdown, rank_success_paths, score_success_path, tokens};

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::cost::MemoryLayer;
use crate::core::state::Axis;
use crate::error::Result;
use crate::memory::objects::{MemoryObject, ObjectType};
use crate::store::{FailureOutcome, MemoryEntryVector, Repository};

pub const SUCCESS_PATH_LIMIT: i64 = 50;
pub const SIMILAR_ENTRY_LIMIT: usize = 40;
/// Newest entries scanned for similarity (layer-4 entries get their own window).
pub const SIMILARITY_SCAN_WINDOW: i64 = 500;
pub const FAILURE_OUTCOME_LIMIT: i64 = 80;
pub const SYSTEM_CAUSED_WINDOW: i64 = 20;

pub struct RetrievalQuery<'a> {
    pub user_id: &'a str,
    pub risk_vector: Option<&'a [f64]>,
    pub intent: &'a str,
    pub required_slots: &'a [String],
    pub main_constraint: Option<Axis>,
    pub gate_threshold: f64,
    /// Entry written for the message being processed, never its own match.
    pub exclude_entry: Option<Uuid>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarEntry {
    pub entry_id: Uuid,
    pub memory_weight: f64,
    pub memory_layer: MemoryLayer,
    pub continuity_cost: f64,
    pub irreversible: bool,
    pub system_caused: bool,
    pub similarity: f64,
}

impl From<(MemoryEntryVector, f64)> for SimilarEntry {
    fn from((entry, similarity): (MemoryEntryVector, f64)) -> Self {
        Self {
            entry_id: entry.entry_id,
            memory_weight: entry.memory_weight,
            memory_layer: entry.memory_layer,
            continuity_cost: entry.continuity_cost,
            irreversible: entry.irreversible,
            system_caused: entry.system_caused,
            similarity,
        }
    }
}

/// Outcome of the layer-4 safety gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub hit: bool,
    pub threshold: f64,
    /// The matched candidate, present only on a hit.
    pub top: Option<SimilarEntry>,
}

/// Evaluate the gate over the most similar layer-4 candidate.
pub fn evaluate_gate(similar: &[SimilarEntry], threshold: f64) -> GateResult {
    let top = similar
        .iter()
        .filter(|m| m.memory_layer == MemoryLayer::L4)
        .max_by(|a, b| a.similarity.total_cmp(&b.similarity))
        .filter(|m| m.similarity >= threshold)
        .cloned();
    GateResult {
        hit: top.is_some(),
        threshold,
        top,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub ranked_success_paths: Vec<RankedSuccessPath>,
    pub similar_entries: Vec<SimilarEntry>,
    pub l4_gate: GateResult,
    pub failure_features: BTreeSet<FailureFeature>,
    pub matched_failure_types: Vec<MatchedFailure>,
    pub system_caused_count: i64,
    pub feature_penalty: f64,
}

impl RetrievalResult {
    pub fn best_success_path(&self) -> Option<&RankedSuccessPath> {
        self.ranked_success_paths.first()
    }
}

/// Fetched rows, handed to [`assemble`].
#[derive(Debug, Clone, Default)]
pub struct RetrievalInputs {
    /// Success paths, newest first.
    pub success_paths: Vec<MemoryObject>,
    /// Entries with similarity, most similar first.
    pub similar: Vec<(MemoryEntryVector, f64)>,
    pub failure_outcomes: Vec<FailureOutcome>,
    pub system_caused_count: i64,
}

pub fn assemble(query: &RetrievalQuery<'_>, inputs: RetrievalInputs) -> RetrievalResult {
    let ranked = rank_success_paths(
        &inputs.success_paths,
        query.intent,
        query.required_slots,
        query.main_constraint,
        query.now,
    );

    let similar: Vec<SimilarEntry> = inputs.similar.into_iter().map(SimilarEntry::from).collect();
    let l4_gate = evaluate_gate(&similar, query.gate_threshold);

    let features = extract_failure_features(query.intent);
    let matched = match_failures(&features, &inputs.failure_outcomes, query.now);
    let penalty = feature_penalty(&features, &matched, inputs.system_caused_count);

    RetrievalResult {
        ranked_success_paths: ranked,
        similar_entries: similar,
        l4_gate,
        failure_features: features,
        matched_failure_types: matched,
        system_caused_count: inputs.system_caused_count,
        feature_penalty: ranking::round6(penalty),
    }
}

/// Fetch everything retrieval needs through `repo` and assemble it.
/// Performs no writes.
pub async fn retrieve(repo: &mut Repository<'_>, query: &RetrievalQuery<'_>) -> Result<RetrievalResult> {
    let success_paths = repo
        .recent_objects(query.user_id, Some(ObjectType::SuccessPath), SUCCESS_PATH_LIMIT)
        .await?;
    let similar = match query.risk_vector {
        Some(vector) => {
            repo.similar_memory_entries(
                query.user_id,
                vector,
                SIMILAR_ENTRY_LIMIT,
                SIMILARITY_SCAN_WINDOW,
                query.exclude_entry,
            )
            .await?
        }
        None => Vec::new(),
    };
    let failure_outcomes = repo
        .recent_failure_outcomes(query.user_id, FAILURE_OUTCOME_LIMIT)
        .await?;
    let system_caused_count = repo
        .recent_system_caused_count(query.user_id, SYSTEM_CAUSED_WINDOW)
        .await?;

    Ok(assemble(
        query,
        RetrievalInputs {
            success_paths,
            similar,
            failure_outcomes,
            system_caused_count,
        },
    ))
}
