use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::FailureOutcome;

const FAILURE_PENALTY_WEIGHT: f64 = 3.0;
const SYSTEM_ERROR_PER_ENTRY: f64 = 0.8;
const SYSTEM_ERROR_CAP: f64 = 10.0;
pub const MAX_FEATURE_PENALTY: f64 = 30.0;

/// Failure tags recognised in message text and in recorded outcomes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureFeature {
    ContextLoss,
    DataLoss,
    HighRisk,
    RepeatError,
    SystemError,
}

const FEATURE_KEYWORDS: &[(FailureFeature, &[&str])] = &[
    (
        FailureFeature::DataLoss,
        &["删库", "删除", "覆盖", "回滚", "丢失", "loss", "delete"],
    ),
    (
        FailureFeature::RepeatError,
        &["盲试", "重试", "重复", "again", "retry"],
    ),
    (
        FailureFeature::ContextLoss,
        &["上下文", "重复解释", "lost context", "context"],
    ),
    (
        FailureFeature::SystemError,
        &["系统", "assistant", "工具", "不靠谱", "忘"],
    ),
    (
        FailureFeature::HighRisk,
        &["高风险", "危险", "不可逆", "风险", "risk", "irreversible"],
    ),
];

/// Case-insensitive substring match against the fixed keyword sets.
pub fn extract_failure_features(text: &str) -> BTreeSet<FailureFeature> {
    let lowered = text.to_lowercase();
    FEATURE_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(feature, _)| *feature)
        .collect()
}

/// Step decay by age: ≤3 days 1.0, ≤14 0.7, ≤60 0.4, older 0.2.
/// Timestamps in the future count as age zero.
pub fn recency_factor(at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let days = ((now - at).num_seconds() as f64 / 86_400.0).max(0.0);
    if days <= 3.0 {
        1.0
    } else if days <= 14.0 {
        0.7
    } else if days <= 60.0 {
        0.4
    } else {
        0.2
    }
}

/// One recorded failure whose tags overlap the message's features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedFailure {
    pub failure_type: String,
    pub matched_features: Vec<FailureFeature>,
    pub recency_factor: f64,
    pub penalty: f64,
}

/// Parse a comma-separated failure type into known tags. Unknown tags are
/// ignored.
fn failure_tags(failure_type: &str) -> BTreeSet<FailureFeature> {
    failure_type
        .split(',')
        .filter_map(|tag| tag.trim().parse().ok())
        .collect()
}

pub fn match_failures(
    features: &BTreeSet<FailureFeature>,
    outcomes: &[FailureOutcome],
    now: DateTime<Utc>,
) -> Vec<MatchedFailure> {
    outcomes
        .iter()
        .filter_map(|outcome| {
            let failure_type = outcome.failure_type.to_lowercase();
            let matched: Vec<FailureFeature> = failure_tags(&failure_type)
                .intersection(features)
                .copied()
                .collect();
            if matched.is_empty() {
                return None;
            }
            let recency = recency_factor(outcome.created_at, now);
            Some(MatchedFailure {
                failure_type,
                matched_features: matched,
                recency_factor: recency,
                penalty: FAILURE_PENALTY_WEIGHT * recency,
            })
        })
        .collect()
}

/// Sum of matched penalties plus the system-error surcharge, clamped to
/// `[0, 30]`.
pub fn feature_penalty(
    features: &BTreeSet<FailureFeature>,
    matched: &[MatchedFailure],
    system_caused_count: i64,
) -> f64 {
    let mut total: f64 = matched.iter().map(|m| m.penalty).sum();
    if features.contains(&FailureFeature::SystemError) {
        #[allow(clippy::cast_precision_loss)]
        let surcharge = SYSTEM_ERROR_PER_ENTRY * system_caused_count.max(0) as f64;
        total += surcharge.min(SYSTEM_ERROR_CAP);
    }
    total.clamp(0.0, MAX_FEATURE_PENALTY)
}
