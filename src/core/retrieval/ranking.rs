use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::features::recency_factor;
use crate::core::state::Axis;
use crate::memory::objects::{MemoryObject, SuccessPathPayload};

const W_INTENT: f64 = 3.0;
const W_SLOTS: f64 = 2.5;
const W_CONSTRAINT: f64 = 1.5;
const W_CONFIDENCE: f64 = 1.0;
const W_RECENCY: f64 = 0.5;

/// Per-term contributions before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub intent_rel: f64,
    pub slot_cov: f64,
    pub constraint_rel: f64,
    pub conf_rel: f64,
    pub recency_rel: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        W_INTENT * self.intent_rel
            + W_SLOTS * self.slot_cov
            + W_CONSTRAINT * self.constraint_rel
            + W_CONFIDENCE * self.conf_rel
            + W_RECENCY * self.recency_rel
    }

    fn rounded(self) -> Self {
        Self {
            intent_rel: round6(self.intent_rel),
            slot_cov: round6(self.slot_cov),
            constraint_rel: round6(self.constraint_rel),
            conf_rel: round6(self.conf_rel),
            recency_rel: round6(self.recency_rel),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSuccessPath {
    pub object_id: Uuid,
    pub name: String,
    pub retrieval_score: f64,
    pub score_breakdown: ScoreBreakdown,
    #[serde(skip)]
    pub path: SuccessPathPayload,
}

/// Lowercased alphanumeric runs of at least two characters.
pub fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

pub fn score_success_path(
    path: &SuccessPathPayload,
    object: &MemoryObject,
    intent: &str,
    required_slots: &[String],
    main_constraint: Option<Axis>,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    let query = tokens(intent);
    let haystack = tokens(&format!("{} {} {}", path.name, path.intent, path.tags.join(" ")));
    #[allow(clippy::cast_precision_loss)]
    let intent_rel = if query.is_empty() {
        0.0
    } else {
        query.intersection(&haystack).count() as f64 / query.len() as f64
    };

    let required: HashSet<&str> = required_slots
        .iter()
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .collect();
    #[allow(clippy::cast_precision_loss)]
    let slot_cov = if required.is_empty() {
        0.0
    } else {
        let declared: HashSet<&str> = path.required_slots.iter().map(String::as_str).collect();
        required.intersection(&declared).count() as f64 / required.len() as f64
    };

    let constraint_rel = main_constraint.map_or(0.0, |axis| {
        let blob = [
            path.name.as_str(),
            path.intent.as_str(),
            path.procedure.as_str(),
            path.tags.join(" ").as_str(),
        ]
        .join(" ")
        .to_lowercase();
        if blob.contains(axis.as_str()) { 1.0 } else { 0.0 }
    });

    ScoreBreakdown {
        intent_rel,
        slot_cov,
        constraint_rel,
        conf_rel: object.confidence.rank(),
        recency_rel: recency_factor(object.updated_at, now),
    }
}

/// Score and stable-sort success paths, best first. Equal scores keep the
/// input order, so callers pass objects newest first.
pub fn rank_success_paths(
    objects: &[MemoryObject],
    intent: &str,
    required_slots: &[String],
    main_constraint: Option<Axis>,
    now: DateTime<Utc>,
) -> Vec<RankedSuccessPath> {
    let mut ranked: Vec<RankedSuccessPath> = objects
        .iter()
        .filter_map(|object| {
            let path = object.as_success_path()?;
            let breakdown =
                score_success_path(path, object, intent, required_slots, main_constraint, now);
            Some(RankedSuccessPath {
                object_id: object.object_id,
                name: path.name.clone(),
                retrieval_score: round6(breakdown.total()),
                score_breakdown: breakdown.rounded(),
                path: path.clone(),
            })
        })
        .collect();
    ranked.sort_by(|a, b| b.retrieval_score.total_cmp(&a.retrieval_score));
    ranked
}

pub(crate) fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}
