//! Decision scoring with the layer-4 safety gate.
//!
//! Scoring is a two-state machine. [`DecisionPath::Gated`] is decided before
//! any arithmetic runs and no combination of gain or cost can leave it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DecisionConfig;
use crate::core::impact::EventImpactResult;
use crate::core::retrieval::{GateResult, SimilarEntry};
use crate::core::state::Axis;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
    DirectExecute,
    Clarify,
    ConfirmHighRisk,
    RecoveryMode,
}

impl ActionKind {
    pub fn description(self) -> &'static str {
        match self {
            Self::DirectExecute => "execute minimal action",
            Self::Clarify => "ask clarifying question",
            Self::ConfirmHighRisk => "explicit second confirmation required",
            Self::RecoveryMode => "switch to safer path",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateAction {
    pub name: ActionKind,
    pub description: String,
}

impl CandidateAction {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            name: kind,
            description: kind.description().to_string(),
        }
    }
}

/// The chosen action plus confirmation metadata attached after a successful
/// high-risk confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedAction {
    pub name: ActionKind,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_id: Option<Uuid>,
}

impl SelectedAction {
    pub fn new(name: ActionKind) -> Self {
        Self {
            name,
            confirmed: false,
            confirmed_at: None,
            confirmed_by: None,
            confirmation_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DecisionScore {
    pub score: f64,
    pub predicted_gain: f64,
    pub predicted_risk: f64,
    pub memory_penalty: f64,
    pub uncertainty_penalty: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DecisionPath {
    Normal,
    Gated,
}

impl DecisionPath {
    pub fn from_gate(gate: &GateResult) -> Self {
        if gate.hit { Self::Gated } else { Self::Normal }
    }
}

/// Numbers scoring needs from the rest of the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInputs<'a> {
    pub impact: &'a EventImpactResult,
    pub predicted_cost: f64,
    pub similar: &'a [SimilarEntry],
    pub feature_penalty: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub path: DecisionPath,
    pub score: DecisionScore,
    pub candidate_actions: Vec<CandidateAction>,
    pub selected_action: SelectedAction,
}

impl Decision {
    pub fn selected(&self) -> ActionKind {
        self.selected_action.name
    }
}

/// `max(0, -Δtime) + max(0, Δidentity)`.
pub fn predicted_gain(impact: &EventImpactResult) -> f64 {
    let delta = &impact.impact_vector;
    (-delta[Axis::Time]).max(0.0) + delta[Axis::Identity].max(0.0)
}

pub fn uncertainty_penalty(impact: &EventImpactResult, k: f64) -> f64 {
    k * (1.0 - impact.analysis_confidence)
}

/// `Σ weight · similarity · multiplier(layer)` over retrieved entries.
pub fn memory_penalty(similar: &[SimilarEntry], ladder: &[f64; 4]) -> f64 {
    similar
        .iter()
        .map(|m| m.memory_weight * m.similarity * m.memory_layer.multiplier(ladder))
        .sum()
}

pub fn decide(inputs: &ScoringInputs<'_>, gate: &GateResult, policy: &DecisionConfig) -> Decision {
    let gain = predicted_gain(inputs.impact);
    let uncertainty = uncertainty_penalty(inputs.impact, policy.uncertainty_k);
    let fp = inputs.feature_penalty;

    match DecisionPath::from_gate(gate) {
        DecisionPath::Gated => {
            let memory = policy.gate_floor_penalty + fp;
            Decision {
                path: DecisionPath::Gated,
                score: DecisionScore {
                    score: policy.gated_score,
                    predicted_gain: gain,
                    predicted_risk: inputs.predicted_cost + memory,
                    memory_penalty: memory,
                    uncertainty_penalty: uncertainty,
                },
                candidate_actions: vec![
                    CandidateAction::new(ActionKind::ConfirmHighRisk),
                    CandidateAction::new(ActionKind::RecoveryMode),
                ],
                selected_action: SelectedAction::new(ActionKind::ConfirmHighRisk),
            }
        }
        DecisionPath::Normal => {
            let memory = memory_penalty(inputs.similar, &policy.layer_multipliers);
            let risk = inputs.predicted_cost + memory;
            let score = gain - risk - uncertainty - fp;
            let selected = if score >= policy.safe_threshold {
                ActionKind::DirectExecute
            } else {
                ActionKind::Clarify
            };
            Decision {
                path: DecisionPath::Normal,
                score: DecisionScore {
                    score,
                    predicted_gain: gain,
                    predicted_risk: risk + fp,
                    memory_penalty: memory + fp,
                    uncertainty_penalty: uncertainty,
                },
                candidate_actions: vec![
                    CandidateAction::new(ActionKind::DirectExecute),
                    CandidateAction::new(ActionKind::Clarify),
                ],
                selected_action: SelectedAction::new(selected),
            }
        }
    }
}
