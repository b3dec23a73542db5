use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for the continuity pipeline.
///
/// Every variant is a rejection the caller can act on; nothing here is fatal
/// to the process. Upstream extractor failures never surface as a variant:
/// they are recovered locally by the fallback extractor.
#[derive(Debug, Error)]
pub enum ContinuityError {
    // ── Validation ──────────────────────────────────────────────────────
    #[error("validation failed: {0}")]
    Validation(String),

    // ── Lookup ──────────────────────────────────────────────────────────
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    // ── Confirmation ────────────────────────────────────────────────────
    /// Deliberately uniform: never says which check failed.
    #[error("invalid or expired confirmation token")]
    ConfirmationInvalid,

    // ── Idempotency ─────────────────────────────────────────────────────
    #[error("idempotency key '{key}' was already used with a different payload")]
    IdempotencyConflict { key: String },

    // ── Outcome loop ────────────────────────────────────────────────────
    #[error("outcome for decision {decision_id} was already reconciled")]
    OutcomeAlreadyReconciled { decision_id: i64 },

    // ── Storage ─────────────────────────────────────────────────────────
    #[error("storage: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ContinuityError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for rejections caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::NotFound { .. }
                | Self::ConfirmationInvalid
                | Self::IdempotencyConflict { .. }
                | Self::OutcomeAlreadyReconciled { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ContinuityError>;

// ─── Impact extractor errors ─────────────────────────────────────────────────

/// Failure modes of the external impact extractor. These are converted into a
/// fallback extraction by the orchestrator and recorded in the trace.
#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("llm_unavailable:{0}")]
    Unavailable(String),

    #[error("llm_timeout:{0}s")]
    Timeout(u64),

    #[error("llm_no_json:{0}")]
    NoJson(String),

    #[error("llm_parse_failed:{0}")]
    Parse(String),
}
