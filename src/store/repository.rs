use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use super::records::{
    ConfirmationRecord, DecisionRecord, FailureOutcome, MemoryEntryVector, NewConfirmation,
    NewDecision, NewMemoryEntry, OutcomeRecord, OutcomeUpdate, StateEvidence,
};
use super::{parse_timestamp, parse_uuid, timestamp};
use crate::core::cost::MemoryLayer;
use crate::core::scoring::DecisionScore;
use crate::core::state::{Axis, UserState};
use crate::error::Result;
use crate::memory::objects::{MemoryObject, ObjectType, StoredPayload};
use crate::memory::vector::{bytes_to_vec, nearest, vec_to_bytes};

/// Every read and write the pipeline performs, over one connection.
///
/// Built over a transaction for units of work, or over a plain pooled
/// connection for one-off reads.
pub struct Repository<'c> {
    conn: &'c mut SqliteConnection,
}

const OBJECT_COLUMNS: &str =
    "object_id, user_id, payload_json, confidence, validity, updated_at";

const DECISION_COLUMNS: &str = "id, user_id, context, candidate_actions, selected_action, \
     predicted_gain, predicted_risk, uncertainty_penalty, memory_penalty, decision_score, \
     trace_id, created_at";

const OUTCOME_COLUMNS: &str = "outcome_id, decision_id, user_id, predicted_impact_vector, \
     predicted_cost, actual_impact_vector, actual_cost, vector_error_l1, cost_error, \
     continuity_failure, failure_type, user_visible_cost, preventable, created_at, reconciled_at";

impl<'c> Repository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    // ── User state ───────────────────────────────────────────────────

    pub async fn get_user_state(&mut self, user_id: &str) -> Result<Option<UserState>> {
        let row = sqlx::query(
            "SELECT user_id, axes, main_constraint, uncertainty_meta, update_count, last_updated
             FROM user_state WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.conn)
        .await?;
        row.as_ref().map(row_to_user_state).transpose()
    }

    /// Get-or-create. A fresh user starts from [`UserState::new`].
    pub async fn ensure_user_state(&mut self, user_id: &str, now: DateTime<Utc>) -> Result<UserState> {
        if let Some(state) = self.get_user_state(user_id).await? {
            return Ok(state);
        }
        let fresh = UserState::new(user_id);
        sqlx::query(
            "INSERT INTO user_state (user_id, axes, main_constraint, uncertainty_meta, update_count, last_updated)
             VALUES ($1, $2, NULL, $3, 0, $4)
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(serde_json::to_string(&fresh.axes)?)
        .bind(fresh.uncertainty_meta)
        .bind(timestamp(now))
        .execute(&mut *self.conn)
        .await?;

        match self.get_user_state(user_id).await? {
            Some(state) => Ok(state),
            None => Err(sqlx::Error::RowNotFound.into()),
        }
    }

    pub async fn save_user_state(&mut self, state: &UserState) -> Result<()> {
        sqlx::query(
            "UPDATE user_state
             SET axes = $2, main_constraint = $3, uncertainty_meta = $4,
                 update_count = $5, last_updated = $6
             WHERE user_id = $1",
        )
        .bind(&state.user_id)
        .bind(serde_json::to_string(&state.axes)?)
        .bind(state.main_constraint.map(Axis::as_str))
        .bind(state.uncertainty_meta)
        .bind(state.update_count)
        .bind(state.last_updated.map(timestamp))
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    pub async fn write_state_evidence(&mut self, evidence: &StateEvidence<'_>) -> Result<()> {
        sqlx::query(
            "INSERT INTO state_evidence (
                user_id, resource_axis, before_value, after_value,
                signal_type, signal_text, weight, confidence, created_at
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(evidence.user_id)
        .bind(evidence.axis.as_str())
        .bind(evidence.transition.before.value)
        .bind(evidence.transition.after.value)
        .bind(evidence.signal_type)
        .bind(evidence.signal_text)
        .bind(evidence.weight)
        .bind(evidence.confidence)
        .bind(timestamp(evidence.created_at))
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    pub async fn count_state_evidence(&mut self, user_id: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM state_evidence WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&mut *self.conn)
                .await?;
        Ok(count)
    }

    // ── Memory entries ───────────────────────────────────────────────

    pub async fn insert_memory_entry(&mut self, entry: &NewMemoryEntry<'_>) -> Result<Uuid> {
        let entry_id = Uuid::new_v4();
        let impact = entry.impact;
        let predicted: BTreeMap<Axis, f64> = (*impact.impact_vector.as_map()).into();
        sqlx::query(
            "INSERT INTO memory_entries (
                entry_id, user_id, event_class, raw_context,
                impact_vector, axis_confidence, missing_axes,
                continuity_cost, irreversible, system_caused,
                memory_weight, memory_layer, risk_vector, created_at
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(entry_id.to_string())
        .bind(entry.user_id)
        .bind(&impact.event_class)
        .bind(entry.raw_context)
        .bind(serde_json::to_string(&predicted)?)
        .bind(serde_json::to_string(&impact.axis_confidence)?)
        .bind(serde_json::to_string(&impact.missing_axes)?)
        .bind(entry.assessment.cost)
        .bind(impact.irreversible)
        .bind(impact.system_caused)
        .bind(entry.assessment.weight)
        .bind(i64::from(entry.assessment.layer.as_u8()))
        .bind(vec_to_bytes(&entry.assessment.risk_vector))
        .bind(timestamp(entry.created_at))
        .execute(&mut *self.conn)
        .await?;
        Ok(entry_id)
    }

    /// Brute-force cosine search over the user's entries, most similar first.
    ///
    /// Only the latest `window` entries are scanned, plus the latest `window`
    /// layer-4 entries so that an old irreversible event still gates.
    pub async fn similar_memory_entries(
        &mut self,
        user_id: &str,
        query: &[f64],
        limit: usize,
        window: i64,
        exclude: Option<Uuid>,
    ) -> Result<Vec<(MemoryEntryVector, f64)>> {
        let rows = sqlx::query(
            "SELECT entry_id, memory_weight, memory_layer, continuity_cost,
                    irreversible, system_caused, risk_vector
             FROM memory_entries
             WHERE rowid IN (
                    SELECT rowid FROM memory_entries
                    WHERE user_id = $1
                    ORDER BY created_at DESC, rowid DESC
                    LIMIT $2
                 )
                OR rowid IN (
                    SELECT rowid FROM memory_entries
                    WHERE user_id = $1 AND memory_layer = 4
                    ORDER BY created_at DESC, rowid DESC
                    LIMIT $2
                 )
             ORDER BY created_at DESC, rowid DESC",
        )
        .bind(user_id)
        .bind(window)
        .fetch_all(&mut *self.conn)
        .await?;

        let exclude = exclude.map(|id| id.to_string());
        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let entry_id: String = row.try_get("entry_id")?;
            if exclude.as_deref() == Some(entry_id.as_str()) {
                continue;
            }
            let layer: i64 = row.try_get("memory_layer")?;
            let blob: Vec<u8> = row.try_get("risk_vector")?;
            let entry = MemoryEntryVector {
                entry_id: parse_uuid(&entry_id)?,
                memory_weight: row.try_get("memory_weight")?,
                memory_layer: decode_layer(layer)?,
                continuity_cost: row.try_get("continuity_cost")?,
                irreversible: row.try_get("irreversible")?,
                system_caused: row.try_get("system_caused")?,
                risk_vector: bytes_to_vec(&blob),
            };
            let vector = entry.risk_vector.clone();
            candidates.push((entry, vector));
        }
        Ok(nearest(query, candidates, limit))
    }

    /// How many of the user's latest `window` entries were system-caused.
    pub async fn recent_system_caused_count(&mut self, user_id: &str, window: i64) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM (
                SELECT 1 FROM memory_entries
                WHERE user_id = $1 AND system_caused = 1
                ORDER BY created_at DESC, rowid DESC
                LIMIT $2
             )",
        )
        .bind(user_id)
        .bind(window)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(count)
    }

    pub async fn count_memory_entries(&mut self, user_id: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM memory_entries WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&mut *self.conn)
                .await?;
        Ok(count)
    }

    // ── Memory objects ───────────────────────────────────────────────

    pub async fn insert_memory_object(&mut self, object: &MemoryObject) -> Result<()> {
        let updated_at = timestamp(object.updated_at);
        sqlx::query(
            "INSERT INTO memory_objects (
                object_id, user_id, object_type, name, text_index,
                payload_json, confidence, validity, updated_at
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(object.object_id.to_string())
        .bind(&object.user_id)
        .bind(object.object_type().to_string())
        .bind(object.name())
        .bind(object.text_index(&updated_at))
        .bind(serde_json::to_string(&object.stored_payload())?)
        .bind(object.confidence.to_string())
        .bind(object.validity.to_string())
        .bind(&updated_at)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    /// Newest first; ties keep insertion order reversed.
    pub async fn recent_objects(
        &mut self,
        user_id: &str,
        object_type: Option<ObjectType>,
        limit: i64,
    ) -> Result<Vec<MemoryObject>> {
        let rows = match object_type {
            Some(kind) => {
                sqlx::query(&format!(
                    "SELECT {OBJECT_COLUMNS} FROM memory_objects
                     WHERE user_id = $1 AND object_type = $2
                     ORDER BY updated_at DESC, rowid DESC
                     LIMIT $3"
                ))
                .bind(user_id)
                .bind(kind.to_string())
                .bind(limit)
                .fetch_all(&mut *self.conn)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {OBJECT_COLUMNS} FROM memory_objects
                     WHERE user_id = $1
                     ORDER BY updated_at DESC, rowid DESC
                     LIMIT $2"
                ))
                .bind(user_id)
                .bind(limit)
                .fetch_all(&mut *self.conn)
                .await?
            }
        };
        rows.iter().map(row_to_object).collect()
    }

    pub async fn latest_shell(&mut self, user_id: &str) -> Result<Option<MemoryObject>> {
        Ok(self
            .recent_objects(user_id, Some(ObjectType::Shell), 1)
            .await?
            .into_iter()
            .next())
    }

    // ── Decisions ────────────────────────────────────────────────────

    pub async fn insert_decision(&mut self, decision: &NewDecision<'_>) -> Result<i64> {
        let score = decision.score;
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO decision_log (
                user_id, context, candidate_actions, selected_action,
                predicted_gain, predicted_risk, uncertainty_penalty, memory_penalty,
                decision_score, trace_id, created_at
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING id",
        )
        .bind(decision.user_id)
        .bind(decision.context)
        .bind(serde_json::to_string(decision.candidate_actions)?)
        .bind(serde_json::to_string(decision.selected_action)?)
        .bind(score.predicted_gain)
        .bind(score.predicted_risk)
        .bind(score.uncertainty_penalty)
        .bind(score.memory_penalty)
        .bind(score.score)
        .bind(decision.trace_id.to_string())
        .bind(timestamp(decision.created_at))
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(id)
    }

    pub async fn get_decision(&mut self, id: i64, user_id: &str) -> Result<Option<DecisionRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {DECISION_COLUMNS} FROM decision_log WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *self.conn)
        .await?;
        row.as_ref().map(row_to_decision).transpose()
    }

    /// Attach confirmation metadata to the decision's selected action.
    /// Returns false when no such decision exists for the user.
    pub async fn mark_decision_confirmed(
        &mut self,
        id: i64,
        user_id: &str,
        confirmation_id: Uuid,
        confirmed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE decision_log
             SET selected_action = json_set(
                    selected_action,
                    '$.confirmed', json('true'),
                    '$.confirmed_at', $3,
                    '$.confirmed_by', $2,
                    '$.confirmation_id', $4)
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .bind(timestamp(confirmed_at))
        .bind(confirmation_id.to_string())
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // ── High-risk confirmations ──────────────────────────────────────

    pub async fn create_confirmation(&mut self, confirmation: &NewConfirmation<'_>) -> Result<()> {
        sqlx::query(
            "INSERT INTO high_risk_confirmations (
                confirmation_id, decision_id, user_id, token_hash,
                expires_at, reason, payload, consumed_at, created_at
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, $8)",
        )
        .bind(confirmation.confirmation_id.to_string())
        .bind(confirmation.decision_id)
        .bind(confirmation.user_id)
        .bind(confirmation.token_hash)
        .bind(timestamp(confirmation.expires_at))
        .bind(confirmation.reason)
        .bind(serde_json::to_string(confirmation.payload)?)
        .bind(timestamp(confirmation.created_at))
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    /// Compare-and-swap consumption. All four conditions are checked by the
    /// one conditional UPDATE, so at most one caller can ever see `Some`.
    pub async fn consume_confirmation(
        &mut self,
        decision_id: i64,
        user_id: &str,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>> {
        let now = timestamp(now);
        let row: Option<(String,)> = sqlx::query_as(
            "UPDATE high_risk_confirmations
             SET consumed_at = $4
             WHERE decision_id = $1
               AND user_id = $2
               AND token_hash = $3
               AND consumed_at IS NULL
               AND expires_at > $4
             RETURNING confirmation_id",
        )
        .bind(decision_id)
        .bind(user_id)
        .bind(token_hash)
        .bind(&now)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(row.map(|(id,)| parse_uuid(&id)).transpose()?)
    }

    pub async fn confirmations_for_decision(
        &mut self,
        decision_id: i64,
        user_id: &str,
    ) -> Result<Vec<ConfirmationRecord>> {
        let rows = sqlx::query(
            "SELECT confirmation_id, decision_id, user_id, expires_at, reason, payload,
                    consumed_at, created_at
             FROM high_risk_confirmations
             WHERE decision_id = $1 AND user_id = $2
             ORDER BY created_at, rowid",
        )
        .bind(decision_id)
        .bind(user_id)
        .fetch_all(&mut *self.conn)
        .await?;
        rows.iter().map(row_to_confirmation).collect()
    }

    // ── Action outcomes ──────────────────────────────────────────────

    /// Idempotent on `decision_id`: a retry rewrites the prediction in place.
    pub async fn upsert_pending_outcome(
        &mut self,
        decision_id: i64,
        user_id: &str,
        predicted: &BTreeMap<Axis, f64>,
        predicted_cost: f64,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        let (outcome_id,): (String,) = sqlx::query_as(
            "INSERT INTO action_outcome (
                outcome_id, decision_id, user_id, predicted_impact_vector,
                predicted_cost, continuity_failure, created_at
             ) VALUES ($1, $2, $3, $4, $5, 0, $6)
             ON CONFLICT (decision_id) DO UPDATE
             SET user_id = excluded.user_id,
                 predicted_impact_vector = excluded.predicted_impact_vector,
                 predicted_cost = excluded.predicted_cost
             RETURNING outcome_id",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(decision_id)
        .bind(user_id)
        .bind(serde_json::to_string(predicted)?)
        .bind(predicted_cost)
        .bind(timestamp(now))
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(parse_uuid(&outcome_id)?)
    }

    pub async fn get_outcome(&mut self, decision_id: i64, user_id: &str) -> Result<Option<OutcomeRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {OUTCOME_COLUMNS} FROM action_outcome WHERE decision_id = $1 AND user_id = $2"
        ))
        .bind(decision_id)
        .bind(user_id)
        .fetch_optional(&mut *self.conn)
        .await?;
        row.as_ref().map(row_to_outcome).transpose()
    }

    /// Write the actual outcome once. `None` if it was already reconciled.
    pub async fn reconcile_outcome(&mut self, update: &OutcomeUpdate<'_>) -> Result<Option<OutcomeRecord>> {
        let row = sqlx::query(&format!(
            "UPDATE action_outcome
             SET actual_impact_vector = $2,
                 actual_cost = $3,
                 vector_error_l1 = $4,
                 cost_error = $5,
                 continuity_failure = $6,
                 failure_type = $7,
                 user_visible_cost = $8,
                 preventable = $9,
                 reconciled_at = $10
             WHERE outcome_id = $1 AND reconciled_at IS NULL
             RETURNING {OUTCOME_COLUMNS}"
        ))
        .bind(update.outcome_id.to_string())
        .bind(serde_json::to_string(update.actual_impact_vector)?)
        .bind(update.actual_cost)
        .bind(update.vector_error_l1)
        .bind(update.cost_error)
        .bind(update.continuity_failure)
        .bind(update.failure_type)
        .bind(update.user_visible_cost)
        .bind(update.preventable)
        .bind(timestamp(update.reconciled_at))
        .fetch_optional(&mut *self.conn)
        .await?;
        row.as_ref().map(row_to_outcome).transpose()
    }

    /// Latest outcomes flagged as continuity failures with a failure type.
    pub async fn recent_failure_outcomes(&mut self, user_id: &str, limit: i64) -> Result<Vec<FailureOutcome>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT failure_type, created_at
             FROM action_outcome
             WHERE user_id = $1
               AND continuity_failure = 1
               AND failure_type IS NOT NULL
             ORDER BY created_at DESC, rowid DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&mut *self.conn)
        .await?;
        rows.into_iter()
            .map(|(failure_type, created_at)| {
                Ok(FailureOutcome {
                    failure_type,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    // ── Idempotency cache ────────────────────────────────────────────

    /// Stored `(request_hash, response_json)` for the key, if any.
    pub async fn idempotent_response(
        &mut self,
        user_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<(String, String)>> {
        Ok(sqlx::query_as(
            "SELECT request_hash, response_json
             FROM chat_idempotency
             WHERE user_id = $1 AND idempotency_key = $2",
        )
        .bind(user_id)
        .bind(idempotency_key)
        .fetch_optional(&mut *self.conn)
        .await?)
    }

    /// Returns false when another request already claimed the key.
    pub async fn save_idempotent_response(
        &mut self,
        user_id: &str,
        idempotency_key: &str,
        request_hash: &str,
        response_json: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO chat_idempotency (user_id, idempotency_key, request_hash, response_json, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (user_id, idempotency_key) DO NOTHING",
        )
        .bind(user_id)
        .bind(idempotency_key)
        .bind(request_hash)
        .bind(response_json)
        .bind(timestamp(now))
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // ── Conversation history ─────────────────────────────────────────

    pub async fn insert_conversation(
        &mut self,
        user_id: &str,
        session_id: Uuid,
        role: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO conversation_history (user_id, session_id, role, content, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user_id)
        .bind(session_id.to_string())
        .bind(role)
        .bind(content)
        .bind(timestamp(now))
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    /// `(role, content)` pairs of one session, oldest first.
    pub async fn conversation(&mut self, user_id: &str, session_id: Uuid) -> Result<Vec<(String, String)>> {
        Ok(sqlx::query_as(
            "SELECT role, content FROM conversation_history
             WHERE user_id = $1 AND session_id = $2
             ORDER BY id",
        )
        .bind(user_id)
        .bind(session_id.to_string())
        .fetch_all(&mut *self.conn)
        .await?)
    }
}

fn decode_layer(raw: i64) -> std::result::Result<MemoryLayer, sqlx::Error> {
    u8::try_from(raw)
        .map_err(|e| sqlx::Error::Decode(e.into()))
        .and_then(|v| MemoryLayer::try_from(v).map_err(|e| sqlx::Error::Decode(e.into())))
}

fn decode_json<T: serde::de::DeserializeOwned>(raw: &str) -> std::result::Result<T, sqlx::Error> {
    serde_json::from_str(raw).map_err(|e| sqlx::Error::Decode(e.into()))
}

fn decode_enum<T>(raw: &str) -> std::result::Result<T, sqlx::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse().map_err(|e: T::Err| sqlx::Error::Decode(e.into()))
}

fn opt_timestamp(raw: Option<String>) -> std::result::Result<Option<DateTime<Utc>>, sqlx::Error> {
    raw.as_deref().map(parse_timestamp).transpose()
}

fn row_to_user_state(row: &SqliteRow) -> Result<UserState> {
    let axes: String = row.try_get("axes")?;
    let main_constraint: Option<String> = row.try_get("main_constraint")?;
    Ok(UserState {
        user_id: row.try_get("user_id")?,
        axes: decode_json(&axes)?,
        main_constraint: main_constraint.as_deref().map(decode_enum::<Axis>).transpose()?,
        uncertainty_meta: row.try_get("uncertainty_meta")?,
        update_count: row.try_get("update_count")?,
        last_updated: opt_timestamp(row.try_get("last_updated")?)?,
    })
}

fn row_to_object(row: &SqliteRow) -> Result<MemoryObject> {
    let object_id: String = row.try_get("object_id")?;
    let payload: String = row.try_get("payload_json")?;
    let confidence: String = row.try_get("confidence")?;
    let validity: String = row.try_get("validity")?;
    let updated_at: String = row.try_get("updated_at")?;
    let stored: StoredPayload = decode_json(&payload)?;
    Ok(MemoryObject {
        object_id: parse_uuid(&object_id)?,
        user_id: row.try_get("user_id")?,
        confidence: decode_enum(&confidence)?,
        validity: decode_enum(&validity)?,
        updated_at: parse_timestamp(&updated_at)?,
        kind: stored.kind,
    })
}

fn row_to_decision(row: &SqliteRow) -> Result<DecisionRecord> {
    let candidates: String = row.try_get("candidate_actions")?;
    let selected: String = row.try_get("selected_action")?;
    let trace_id: String = row.try_get("trace_id")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(DecisionRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        context: row.try_get("context")?,
        candidate_actions: decode_json(&candidates)?,
        selected_action: decode_json(&selected)?,
        score: DecisionScore {
            score: row.try_get("decision_score")?,
            predicted_gain: row.try_get("predicted_gain")?,
            predicted_risk: row.try_get("predicted_risk")?,
            memory_penalty: row.try_get("memory_penalty")?,
            uncertainty_penalty: row.try_get("uncertainty_penalty")?,
        },
        trace_id: parse_uuid(&trace_id)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_confirmation(row: &SqliteRow) -> Result<ConfirmationRecord> {
    let confirmation_id: String = row.try_get("confirmation_id")?;
    let expires_at: String = row.try_get("expires_at")?;
    let payload: String = row.try_get("payload")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(ConfirmationRecord {
        confirmation_id: parse_uuid(&confirmation_id)?,
        decision_id: row.try_get("decision_id")?,
        user_id: row.try_get("user_id")?,
        expires_at: parse_timestamp(&expires_at)?,
        reason: row.try_get("reason")?,
        payload: decode_json(&payload)?,
        consumed_at: opt_timestamp(row.try_get("consumed_at")?)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_outcome(row: &SqliteRow) -> Result<OutcomeRecord> {
    let outcome_id: String = row.try_get("outcome_id")?;
    let predicted: String = row.try_get("predicted_impact_vector")?;
    let actual: Option<String> = row.try_get("actual_impact_vector")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(OutcomeRecord {
        outcome_id: parse_uuid(&outcome_id)?,
        decision_id: row.try_get("decision_id")?,
        user_id: row.try_get("user_id")?,
        predicted_impact_vector: decode_json(&predicted)?,
        predicted_cost: row.try_get("predicted_cost")?,
        actual_impact_vector: actual.as_deref().map(decode_json).transpose()?,
        actual_cost: row.try_get("actual_cost")?,
        vector_error_l1: row.try_get("vector_error_l1")?,
        cost_error: row.try_get("cost_error")?,
        continuity_failure: row.try_get("continuity_failure")?,
        failure_type: row.try_get("failure_type")?,
        user_visible_cost: row.try_get("user_visible_cost")?,
        preventable: row.try_get("preventable")?,
        created_at: parse_timestamp(&created_at)?,
        reconciled_at: opt_timestamp(row.try_get("reconciled_at")?)?,
    })
}
