use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::RealityFirstMode;
use crate::core::audit::ContinuityFailure;
use crate::core::impact::ExtractionSource;
use crate::core::intake::TaskType;
use crate::core::retrieval::{
    FailureFeature, GateResult, MatchedFailure, RankedSuccessPath, ScoreBreakdown,
};
use crate::core::scoring::{ActionKind, DecisionPath, DecisionScore};
use crate::core::state::{Axis, UserState};
use crate::error::{ContinuityError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    pub idempotency_key: String,
    /// Slot values the caller already knows, by slot name.
    #[serde(default)]
    pub known_slots: BTreeMap<String, String>,
}

impl ChatRequest {
    pub fn new(
        user_id: impl Into<String>,
        message: impl Into<String>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            message: message.into(),
            session_id: None,
            idempotency_key: idempotency_key.into(),
            known_slots: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("user_id", &self.user_id),
            ("message", &self.message),
            ("idempotency_key", &self.idempotency_key),
        ] {
            if value.trim().is_empty() {
                return Err(ContinuityError::Validation(format!("{field} is required")));
            }
        }
        Ok(())
    }

    /// SHA-256 over the canonical JSON form. Field order is fixed by the
    /// struct and slot maps are sorted, so equal requests hash equally.
    pub fn request_hash(&self) -> Result<String> {
        let canonical = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: Uuid,
    pub response: String,
    #[serde(default)]
    pub asked_questions: Vec<String>,
    #[serde(default)]
    pub decision: Option<DecisionScore>,
    pub user_state: UserState,
    pub trace: DecisionTrace,
}

impl ChatResponse {
    /// Copy safe to persist: the raw confirmation token is stripped.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let DecisionTrace::Scored(trace) = &mut copy.trace {
            trace.high_risk_confirmation.confirm_token = None;
        }
        copy
    }

    pub fn confirm_token(&self) -> Option<&str> {
        match &self.trace {
            DecisionTrace::Scored(trace) => trace.high_risk_confirmation.confirm_token.as_deref(),
            DecisionTrace::ClarifyFirst(_) => None,
        }
    }

    pub fn decision_id(&self) -> Option<i64> {
        match &self.trace {
            DecisionTrace::Scored(trace) => Some(trace.decision_id),
            DecisionTrace::ClarifyFirst(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DecisionTrace {
    ClarifyFirst(ClarifyTrace),
    Scored(Box<ScoredTrace>),
}

impl DecisionTrace {
    pub fn trace_id(&self) -> Uuid {
        match self {
            Self::ClarifyFirst(t) => t.trace_id,
            Self::Scored(t) => t.trace_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intervention {
    Hint,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealityFirstTrace {
    pub mode: RealityFirstMode,
    pub shell_bias_hit: bool,
    pub intervention: Intervention,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarifyTrace {
    pub trace_id: Uuid,
    pub task_type: TaskType,
    pub missing_slots: Vec<String>,
    pub reality_first: RealityFirstTrace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorTrace {
    pub source: ExtractionSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfirmationTrace {
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_id: Option<Uuid>,
    /// Present only in the live response, never in the replay cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestPathTrace {
    pub object_id: Uuid,
    pub name: String,
    pub retrieval_score: f64,
    pub score_breakdown: ScoreBreakdown,
}

impl From<&RankedSuccessPath> for BestPathTrace {
    fn from(ranked: &RankedSuccessPath) -> Self {
        Self {
            object_id: ranked.object_id,
            name: ranked.name.clone(),
            retrieval_score: ranked.retrieval_score,
            score_breakdown: ranked.score_breakdown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTrace {
    pub trace_id: Uuid,
    pub entry_id: Uuid,
    pub decision_id: i64,
    pub outcome_id: Uuid,
    pub outcome_status: String,
    pub path: DecisionPath,
    pub selected_action: ActionKind,
    pub main_constraint: Option<Axis>,
    pub task_type: TaskType,
    pub extractor: ExtractorTrace,
    pub continuity_cost: f64,
    pub memory_layer: u8,
    pub l4_gate: GateResult,
    pub failure_features: BTreeSet<FailureFeature>,
    pub feature_penalty: f64,
    pub matched_failure_types: Vec<MatchedFailure>,
    pub high_risk_confirmation: ConfirmationTrace,
    pub reality_first: RealityFirstTrace,
    pub best_success_path: Option<BestPathTrace>,
    pub continuity_failures: Vec<ContinuityFailure>,
}
