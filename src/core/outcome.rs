//! Predicted vs. actual outcome bookkeeping. Errors are recorded for
//! offline calibration and never fed back into scoring.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::core::impact::EventImpactResult;
use crate::core::state::Axis;
use crate::error::{ContinuityError, Result};
use crate::store::{OutcomeRecord, OutcomeUpdate, Repository, Store};

/// Actual outcome reported by the caller for a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub actual_impact_vector: BTreeMap<Axis, f64>,
    pub actual_cost: f64,
    #[serde(default)]
    pub continuity_failure: bool,
    #[serde(default)]
    pub failure_type: Option<String>,
    #[serde(default)]
    pub user_visible_cost: Option<String>,
    #[serde(default)]
    pub preventable: Option<bool>,
}

impl OutcomeReport {
    pub fn validate(&self) -> Result<()> {
        if !self.actual_cost.is_finite() {
            return Err(ContinuityError::Validation("actual_cost must be finite".into()));
        }
        if let Some((axis, _)) = self.actual_impact_vector.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ContinuityError::Validation(format!(
                "actual_impact_vector.{axis} must be finite"
            )));
        }
        Ok(())
    }
}

/// `Σ |predicted - actual|` over the union of keys, a missing key counting
/// as zero.
pub fn vector_error_l1(predicted: &BTreeMap<Axis, f64>, actual: &BTreeMap<Axis, f64>) -> f64 {
    predicted
        .keys()
        .chain(actual.keys())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .map(|axis| {
            let p = predicted.get(axis).copied().unwrap_or(0.0);
            let a = actual.get(axis).copied().unwrap_or(0.0);
            (p - a).abs()
        })
        .sum()
}

/// Write (or rewrite on retry) the pending prediction for a decision.
pub async fn record_pending(
    repo: &mut Repository<'_>,
    decision_id: i64,
    user_id: &str,
    impact: &EventImpactResult,
    predicted_cost: f64,
    now: DateTime<Utc>,
) -> Result<Uuid> {
    let predicted: BTreeMap<Axis, f64> = (*impact.impact_vector.as_map()).into();
    repo.upsert_pending_outcome(decision_id, user_id, &predicted, predicted_cost, now)
        .await
}

/// Reconcile a pending outcome exactly once.
pub async fn reconcile(
    store: &Store,
    decision_id: i64,
    user_id: &str,
    report: &OutcomeReport,
    now: DateTime<Utc>,
) -> Result<OutcomeRecord> {
    report.validate()?;

    let mut tx = store.begin().await?;
    let mut repo = Repository::new(&mut tx);

    let pending = repo
        .get_outcome(decision_id, user_id)
        .await?
        .ok_or_else(|| ContinuityError::not_found("outcome", decision_id))?;
    if pending.is_reconciled() {
        return Err(ContinuityError::OutcomeAlreadyReconciled { decision_id });
    }

    let l1 = vector_error_l1(&pending.predicted_impact_vector, &report.actual_impact_vector);
    let cost_error = report.actual_cost - pending.predicted_cost;
    let updated = repo
        .reconcile_outcome(&OutcomeUpdate {
            outcome_id: pending.outcome_id,
            actual_impact_vector: &report.actual_impact_vector,
            actual_cost: report.actual_cost,
            vector_error_l1: l1,
            cost_error,
            continuity_failure: report.continuity_failure,
            failure_type: report.failure_type.as_deref(),
            user_visible_cost: report.user_visible_cost.as_deref(),
            preventable: report.preventable,
            reconciled_at: now,
        })
        .await?
        .ok_or(ContinuityError::OutcomeAlreadyReconciled { decision_id })?;
    tx.commit().await?;

    info!(decision_id, user_id, vector_error_l1 = l1, cost_error, "outcome reconciled");
    Ok(updated)
}
