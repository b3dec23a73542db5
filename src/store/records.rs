use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::cost::{CostAssessment, MemoryLayer};
use crate::core::impact::EventImpactResult;
use crate::core::scoring::{CandidateAction, DecisionScore, SelectedAction};
use crate::core::state::{Axis, AxisTransition};

pub struct NewMemoryEntry<'a> {
    pub user_id: &'a str,
    pub raw_context: &'a str,
    pub impact: &'a EventImpactResult,
    pub assessment: &'a CostAssessment,
    pub created_at: DateTime<Utc>,
}

/// The slice of a memory entry needed for similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntryVector {
    pub entry_id: Uuid,
    pub memory_weight: f64,
    pub memory_layer: MemoryLayer,
    pub continuity_cost: f64,
    pub irreversible: bool,
    pub system_caused: bool,
    pub risk_vector: Vec<f64>,
}

pub struct StateEvidence<'a> {
    pub user_id: &'a str,
    pub axis: Axis,
    pub transition: AxisTransition,
    pub signal_type: &'static str,
    pub signal_text: &'a str,
    pub weight: f64,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

pub struct NewDecision<'a> {
    pub user_id: &'a str,
    pub context: &'a str,
    pub candidate_actions: &'a [CandidateAction],
    pub selected_action: &'a SelectedAction,
    pub score: &'a DecisionScore,
    pub trace_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: i64,
    pub user_id: String,
    pub context: String,
    pub candidate_actions: Vec<CandidateAction>,
    pub selected_action: SelectedAction,
    #[serde(flatten)]
    pub score: DecisionScore,
    pub trace_id: Uuid,
    pub created_at: DateTime<Utc>,
}

pub struct NewConfirmation<'a> {
    pub confirmation_id: Uuid,
    pub decision_id: i64,
    pub user_id: &'a str,
    pub token_hash: &'a str,
    pub expires_at: DateTime<Utc>,
    pub reason: &'a str,
    pub payload: &'a Value,
    pub created_at: DateTime<Utc>,
}

/// A confirmation row as seen by callers. The token hash stays in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationRecord {
    pub confirmation_id: Uuid,
    pub decision_id: i64,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub reason: String,
    pub payload: Value,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailureOutcome {
    pub failure_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub outcome_id: Uuid,
    pub decision_id: i64,
    pub user_id: String,
    pub predicted_impact_vector: BTreeMap<Axis, f64>,
    pub predicted_cost: f64,
    pub actual_impact_vector: Option<BTreeMap<Axis, f64>>,
    pub actual_cost: Option<f64>,
    pub vector_error_l1: Option<f64>,
    pub cost_error: Option<f64>,
    pub continuity_failure: bool,
    pub failure_type: Option<String>,
    pub user_visible_cost: Option<String>,
    pub preventable: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub reconciled_at: Option<DateTime<Utc>>,
}

impl OutcomeRecord {
    pub fn is_reconciled(&self) -> bool {
        self.reconciled_at.is_some()
    }
}

pub struct OutcomeUpdate<'a> {
    pub outcome_id: Uuid,
    pub actual_impact_vector: &'a BTreeMap<Axis, f64>,
    pub actual_cost: f64,
    pub vector_error_l1: f64,
    pub cost_error: f64,
    pub continuity_failure: bool,
    pub failure_type: Option<&'a str>,
    pub user_visible_cost: Option<&'a str>,
    pub preventable: Option<bool>,
    pub reconciled_at: DateTime<Utc>,
}
