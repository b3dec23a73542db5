//! Per-message pipeline.
//!
//! One message runs intake, impact extraction, then a single SQL transaction
//! covering every write: state, evidence, memory entry, decision,
//! confirmation, pending outcome, conversation and the idempotency record.
//! Nothing is visible unless that transaction commits.

mod response;
mod types;

pub use response::{CLARIFY_FIRST, ResponseContext};
pub use types::{
    BestPathTrace, ChatRequest, ChatResponse, ClarifyTrace, ConfirmationTrace, DecisionTrace,
    ExtractorTrace, Intervention, RealityFirstTrace, ScoredTrace,
};

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, RealityFirstMode};
use crate::core::audit::{self, AuditInputs};
use crate::core::confirmation::{self, ConfirmationReceipt, GATE_REASON, IssueRequest};
use crate::core::cost::CostAssessment;
use crate::core::impact::{self, ImpactExtraction, ImpactExtractor};
use crate::core::intake::{self, IntakeResult, MAX_QUESTIONS};
use crate::core::outcome::{self, OutcomeReport};
use crate::core::retrieval::{self, FailureFeature, RetrievalQuery};
use crate::core::scoring::{self, ActionKind, ScoringInputs};
use crate::core::state::UserState;
use crate::error::{ContinuityError, Result};
use crate::memory::objects::{MemoryObject, ObjectType, ShellWrite, SuccessPathWrite};
use crate::store::{
    DecisionRecord, NewDecision, NewMemoryEntry, OutcomeRecord, Repository, StateEvidence, Store,
};

const EVIDENCE_SIGNAL: &str = "language";
const EVIDENCE_WEIGHT: f64 = 0.6;
const OUTCOME_PENDING: &str = "pending_actual_feedback";
pub const MAX_OBJECT_LIST: i64 = 200;

pub struct Orchestrator {
    store: Store,
    config: Config,
    extractor: Option<Box<dyn ImpactExtractor>>,
}

/// Reality-check decision for one message.
struct RealityCheck {
    trace: RealityFirstTrace,
    hint: Option<String>,
}

impl RealityCheck {
    fn evaluate(mode: RealityFirstMode, intake: &IntakeResult) -> Self {
        let hit = intake.shell_bias.hit;
        let hint = (mode != RealityFirstMode::Off && hit && intake.task_type.requires_slots_first())
            .then(|| intake.shell_bias.questions.first().cloned())
            .flatten();
        Self {
            trace: RealityFirstTrace {
                mode,
                shell_bias_hit: hit,
                intervention: if hint.is_some() {
                    Intervention::Hint
                } else {
                    Intervention::None
                },
                question: hint.clone(),
            },
            hint,
        }
    }
}

/// What a finished unit of work hands back.
enum Committed {
    Fresh(ChatResponse),
    Replayed(ChatResponse),
}

impl Orchestrator {
    /// Build with the extractor selected by `config.extractor`.
    pub fn new(store: Store, config: Config) -> Self {
        let extractor = impact::primary_extractor(&config.extractor);
        Self::with_extractor(store, config, extractor)
    }

    pub fn with_extractor(
        store: Store,
        config: Config,
        extractor: Option<Box<dyn ImpactExtractor>>,
    ) -> Self {
        Self {
            store,
            config,
            extractor,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ── Chat ─────────────────────────────────────────────────────────

    pub async fn handle_chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        req.validate()?;
        let request_hash = req.request_hash()?;

        if let Some(cached) = self.cached_response(req, &request_hash).await? {
            debug!(user_id = %req.user_id, key = %req.idempotency_key, "idempotent replay");
            return Ok(cached);
        }

        let now = Utc::now();
        let session_id = req.session_id.unwrap_or_else(Uuid::new_v4);
        let trace_id = Uuid::new_v4();
        let intake = intake::run(&req.message, &req.known_slots);
        let reality = RealityCheck::evaluate(self.config.reality_first.mode, &intake);

        let committed = if intake.task_type.requires_slots_first() && !intake.questions.is_empty() {
            self.clarify_first(req, &request_hash, &intake, reality, session_id, trace_id, now)
                .await?
        } else {
            let snapshot = self.state_snapshot(&req.user_id).await?;
            let extraction = impact::extract_with_fallback(
                self.extractor.as_deref(),
                &req.message,
                &snapshot,
                Duration::from_secs(self.config.extractor.timeout_secs),
            )
            .await;
            self.scored(req, &request_hash, &intake, reality, extraction, session_id, trace_id, now)
                .await?
        };

        match committed {
            Committed::Fresh(resp) => Ok(resp),
            Committed::Replayed(resp) => {
                debug!(user_id = %req.user_id, key = %req.idempotency_key, "lost idempotency race");
                Ok(resp)
            }
        }
    }

    /// Stored response for the request's key, or a conflict if the key was
    /// used with a different payload.
    async fn cached_response(&self, req: &ChatRequest, request_hash: &str) -> Result<Option<ChatResponse>> {
        let mut conn = self.store.pool().acquire().await?;
        let mut repo = Repository::new(&mut conn);
        lookup_cached(&mut repo, req, request_hash).await
    }

    async fn state_snapshot(&self, user_id: &str) -> Result<UserState> {
        let mut conn = self.store.pool().acquire().await?;
        Ok(Repository::new(&mut conn)
            .get_user_state(user_id)
            .await?
            .unwrap_or_else(|| UserState::new(user_id)))
    }

    #[allow(clippy::too_many_arguments)]
    async fn clarify_first(
        &self,
        req: &ChatRequest,
        request_hash: &str,
        intake: &IntakeResult,
        reality: RealityCheck,
        session_id: Uuid,
        trace_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Committed> {
        let mut questions = intake.questions.clone();
        if let Some(hint) = &reality.hint
            && questions.len() < MAX_QUESTIONS
            && !questions.contains(hint)
        {
            questions.push(hint.clone());
        }

        let mut tx = self.store.begin().await?;
        let mut repo = Repository::new(&mut tx);
        if let Some(cached) = lookup_cached(&mut repo, req, request_hash).await? {
            return Ok(Committed::Replayed(cached));
        }

        let state = repo.ensure_user_state(&req.user_id, now).await?;
        let resp = ChatResponse {
            session_id,
            response: CLARIFY_FIRST.to_string(),
            asked_questions: questions,
            decision: None,
            user_state: state,
            trace: DecisionTrace::ClarifyFirst(ClarifyTrace {
                trace_id,
                task_type: intake.task_type,
                missing_slots: intake.missing_slots.clone(),
                reality_first: reality.trace,
            }),
        };

        repo.insert_conversation(&req.user_id, session_id, "user", &req.message, now)
            .await?;
        repo.insert_conversation(
            &req.user_id,
            session_id,
            "assistant",
            &response::clarify_transcript(&resp.asked_questions),
            now,
        )
        .await?;

        if !save_cached(&mut repo, req, request_hash, &resp, now).await? {
            drop(tx);
            return self.winner(req, request_hash).await.map(Committed::Replayed);
        }
        tx.commit().await?;

        info!(user_id = %req.user_id, %trace_id, task_type = %intake.task_type, "clarify first");
        Ok(Committed::Fresh(resp))
    }

    #[allow(clippy::too_many_arguments, clippy::too_many_lines)]
    async fn scored(
        &self,
        req: &ChatRequest,
        request_hash: &str,
        intake: &IntakeResult,
        reality: RealityCheck,
        extraction: ImpactExtraction,
        session_id: Uuid,
        trace_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Committed> {
        let user_id = req.user_id.as_str();
        let impact = &extraction.impact;

        let mut tx = self.store.begin().await?;
        let mut repo = Repository::new(&mut tx);
        if let Some(cached) = lookup_cached(&mut repo, req, request_hash).await? {
            return Ok(Committed::Replayed(cached));
        }

        // State update with per-axis evidence.
        let mut state = repo.ensure_user_state(user_id, now).await?;
        let transitions = state.apply_impact(impact, now);
        for (axis, transition) in transitions.iter() {
            repo.write_state_evidence(&StateEvidence {
                user_id,
                axis,
                transition: *transition,
                signal_type: EVIDENCE_SIGNAL,
                signal_text: &req.message,
                weight: EVIDENCE_WEIGHT,
                confidence: impact.axis_confidence[axis].clamp(0.1, 1.0),
                created_at: now,
            })
            .await?;
        }
        repo.save_user_state(&state).await?;

        // Cost, memory entry, retrieval.
        let assessment = CostAssessment::assess(impact, &state);
        let entry_id = repo
            .insert_memory_entry(&NewMemoryEntry {
                user_id,
                raw_context: &req.message,
                impact,
                assessment: &assessment,
                created_at: now,
            })
            .await?;
        let retrieved = retrieval::retrieve(
            &mut repo,
            &RetrievalQuery {
                user_id,
                risk_vector: Some(&assessment.risk_vector),
                intent: &req.message,
                required_slots: &intake.required_slots,
                main_constraint: state.main_constraint,
                gate_threshold: self.config.decision.l4_similarity_gate,
                exclude_entry: Some(entry_id),
                now,
            },
        )
        .await?;

        // Scoring and audit.
        let decision = scoring::decide(
            &ScoringInputs {
                impact,
                predicted_cost: assessment.cost,
                similar: &retrieved.similar_entries,
                feature_penalty: retrieved.feature_penalty,
            },
            &retrieved.l4_gate,
            &self.config.decision,
        );
        let best = retrieved.best_success_path();
        let audit = audit::run(AuditInputs {
            had_success_path: best.is_some(),
            used_success_path: best.is_some() && decision.selected() == ActionKind::DirectExecute,
            asked_before_try: true,
            user_repeated_context: retrieved
                .failure_features
                .contains(&FailureFeature::ContextLoss),
            hallucinated: false,
        });

        let decision_id = repo
            .insert_decision(&NewDecision {
                user_id,
                context: &req.message,
                candidate_actions: &decision.candidate_actions,
                selected_action: &decision.selected_action,
                score: &decision.score,
                trace_id,
                created_at: now,
            })
            .await?;

        let confirmation = if decision.selected() == ActionKind::ConfirmHighRisk {
            let evidence = serde_json::json!({
                "l4_gate": retrieved.l4_gate,
                "feature_penalty": retrieved.feature_penalty,
                "matched_failure_types": retrieved.matched_failure_types,
            });
            let issued = confirmation::issue(
                &mut repo,
                &IssueRequest {
                    decision_id,
                    user_id,
                    reason: GATE_REASON,
                    evidence: &evidence,
                    ttl_minutes: self.config.confirmation.token_ttl_minutes,
                    now,
                },
            )
            .await?;
            warn!(user_id, decision_id, "layer-4 gate hit, confirmation required");
            ConfirmationTrace {
                required: true,
                confirmation_id: Some(issued.confirmation_id),
                confirm_token: Some(issued.token),
                expires_at: Some(issued.expires_at),
            }
        } else {
            ConfirmationTrace::default()
        };

        let outcome_id =
            outcome::record_pending(&mut repo, decision_id, user_id, impact, assessment.cost, now)
                .await?;

        let text = response::build(&ResponseContext {
            selected: decision.selected(),
            score: decision.score.score,
            irreversible: impact.irreversible,
            decision_id,
            gate_similarity: retrieved.l4_gate.top.as_ref().map(|t| t.similarity),
            best_success_path: best.map(|b| b.name.as_str()),
            reality_hint: reality.hint.as_deref(),
        });

        let main_constraint = state.main_constraint;
        let resp = ChatResponse {
            session_id,
            response: text,
            asked_questions: Vec::new(),
            decision: Some(decision.score),
            user_state: state,
            trace: DecisionTrace::Scored(Box::new(ScoredTrace {
                trace_id,
                entry_id,
                decision_id,
                outcome_id,
                outcome_status: OUTCOME_PENDING.to_string(),
                path: decision.path,
                selected_action: decision.selected(),
                main_constraint,
                task_type: intake.task_type,
                extractor: ExtractorTrace {
                    source: extraction.source,
                    fallback_reason: extraction.fallback_reason.clone(),
                },
                continuity_cost: assessment.cost,
                memory_layer: assessment.layer.as_u8(),
                l4_gate: retrieved.l4_gate.clone(),
                failure_features: retrieved.failure_features.clone(),
                feature_penalty: retrieved.feature_penalty,
                matched_failure_types: retrieved.matched_failure_types.clone(),
                high_risk_confirmation: confirmation,
                reality_first: reality.trace,
                best_success_path: best.map(BestPathTrace::from),
                continuity_failures: audit.continuity_failures,
            })),
        };

        repo.insert_conversation(user_id, session_id, "user", &req.message, now)
            .await?;
        repo.insert_conversation(user_id, session_id, "assistant", &resp.response, now)
            .await?;

        if !save_cached(&mut repo, req, request_hash, &resp, now).await? {
            drop(tx);
            return self.winner(req, request_hash).await.map(Committed::Replayed);
        }
        tx.commit().await?;

        info!(
            user_id,
            %trace_id,
            decision_id,
            path = %decision.path,
            selected = %decision.selected(),
            score = decision.score.score,
            extractor = %extraction.source,
            "decision recorded"
        );
        Ok(Committed::Fresh(resp))
    }

    /// Response committed by whichever request won the idempotency race.
    async fn winner(&self, req: &ChatRequest, request_hash: &str) -> Result<ChatResponse> {
        self.cached_response(req, request_hash)
            .await?
            .ok_or_else(|| ContinuityError::IdempotencyConflict {
                key: req.idempotency_key.clone(),
            })
    }

    // ── Auxiliary operations ─────────────────────────────────────────

    /// Current state, or the defaults for a user never seen. Never writes.
    pub async fn user_state(&self, user_id: &str) -> Result<UserState> {
        require_user(user_id)?;
        self.state_snapshot(user_id).await
    }

    pub async fn put_shell(&self, user_id: &str, write: ShellWrite) -> Result<MemoryObject> {
        require_user(user_id)?;
        let object = write.into_object(user_id, Utc::now());
        self.insert_object(&object).await?;
        Ok(object)
    }

    pub async fn put_success_path(&self, user_id: &str, write: SuccessPathWrite) -> Result<MemoryObject> {
        require_user(user_id)?;
        let object = write.into_object(user_id, Utc::now())?;
        self.insert_object(&object).await?;
        Ok(object)
    }

    async fn insert_object(&self, object: &MemoryObject) -> Result<()> {
        let mut tx = self.store.begin().await?;
        Repository::new(&mut tx).insert_memory_object(object).await?;
        tx.commit().await?;
        debug!(user_id = %object.user_id, object_id = %object.object_id, kind = %object.object_type(), "memory object stored");
        Ok(())
    }

    pub async fn latest_shell(&self, user_id: &str) -> Result<MemoryObject> {
        require_user(user_id)?;
        let mut conn = self.store.pool().acquire().await?;
        Repository::new(&mut conn)
            .latest_shell(user_id)
            .await?
            .ok_or_else(|| ContinuityError::not_found("shell", user_id))
    }

    pub async fn list_objects(
        &self,
        user_id: &str,
        object_type: Option<ObjectType>,
        limit: i64,
    ) -> Result<Vec<MemoryObject>> {
        require_user(user_id)?;
        if !(1..=MAX_OBJECT_LIST).contains(&limit) {
            return Err(ContinuityError::Validation(format!(
                "limit must be between 1 and {MAX_OBJECT_LIST}"
            )));
        }
        let mut conn = self.store.pool().acquire().await?;
        Repository::new(&mut conn)
            .recent_objects(user_id, object_type, limit)
            .await
    }

    pub async fn decision(&self, decision_id: i64, user_id: &str) -> Result<DecisionRecord> {
        let mut conn = self.store.pool().acquire().await?;
        Repository::new(&mut conn)
            .get_decision(decision_id, user_id)
            .await?
            .ok_or_else(|| ContinuityError::not_found("decision", decision_id))
    }

    pub async fn confirm_high_risk(
        &self,
        decision_id: i64,
        user_id: &str,
        token: &str,
    ) -> Result<ConfirmationReceipt> {
        require_user(user_id)?;
        confirmation::consume(&self.store, decision_id, user_id, token, Utc::now()).await
    }

    pub async fn report_outcome(
        &self,
        decision_id: i64,
        user_id: &str,
        report: &OutcomeReport,
    ) -> Result<OutcomeRecord> {
        require_user(user_id)?;
        outcome::reconcile(&self.store, decision_id, user_id, report, Utc::now()).await
    }
}

fn require_user(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(ContinuityError::Validation("user_id is required".into()));
    }
    Ok(())
}

async fn lookup_cached(
    repo: &mut Repository<'_>,
    req: &ChatRequest,
    request_hash: &str,
) -> Result<Option<ChatResponse>> {
    let Some((stored_hash, json)) = repo
        .idempotent_response(&req.user_id, &req.idempotency_key)
        .await?
    else {
        return Ok(None);
    };
    if stored_hash != request_hash {
        warn!(user_id = %req.user_id, key = %req.idempotency_key, "idempotency key reused with a different payload");
        return Err(ContinuityError::IdempotencyConflict {
            key: req.idempotency_key.clone(),
        });
    }
    Ok(Some(serde_json::from_str(&json)?))
}

async fn save_cached(
    repo: &mut Repository<'_>,
    req: &ChatRequest,
    request_hash: &str,
    resp: &ChatResponse,
    now: DateTime<Utc>,
) -> Result<bool> {
    let json = serde_json::to_string(&resp.redacted())?;
    repo.save_idempotent_response(&req.user_id, &req.idempotency_key, request_hash, &json, now)
        .await
}
