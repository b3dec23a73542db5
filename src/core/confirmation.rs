//! Single-use confirmation tokens for gated decisions.
//!
//! Only the SHA-256 of a token is persisted. The raw token is handed to the
//! caller once, at issue time. Consumption is one conditional UPDATE so
//! concurrent attempts on the same token have exactly one winner.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ContinuityError, Result};
use crate::store::{NewConfirmation, Repository, Store};

const TOKEN_PREFIX: &str = "hrc_";
pub const GATE_REASON: &str = "l4_gate_hit";

pub fn generate_token() -> String {
    let mut buf = [0u8; 32];
    rand::rng().fill_bytes(&mut buf);
    format!("{TOKEN_PREFIX}{}", hex::encode(buf))
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Returned once when a confirmation is created. `token` is never stored.
#[derive(Debug, Clone)]
pub struct IssuedConfirmation {
    pub confirmation_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct IssueRequest<'a> {
    pub decision_id: i64,
    pub user_id: &'a str,
    pub reason: &'a str,
    pub evidence: &'a Value,
    pub ttl_minutes: i64,
    pub now: DateTime<Utc>,
}

/// Expiry for a token issued at `now`. Negative TTLs expire immediately.
pub fn expiry(now: DateTime<Utc>, ttl_minutes: i64) -> Result<DateTime<Utc>> {
    Duration::try_minutes(ttl_minutes.max(0))
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| {
            ContinuityError::Validation(format!(
                "confirmation ttl of {ttl_minutes} minutes is out of range"
            ))
        })
}

/// Create a pending confirmation inside the caller's unit of work.
pub async fn issue(repo: &mut Repository<'_>, req: &IssueRequest<'_>) -> Result<IssuedConfirmation> {
    let expires_at = expiry(req.now, req.ttl_minutes)?;
    let token = generate_token();
    let token_hash = hash_token(&token);
    let confirmation_id = Uuid::new_v4();

    repo.create_confirmation(&NewConfirmation {
        confirmation_id,
        decision_id: req.decision_id,
        user_id: req.user_id,
        token_hash: &token_hash,
        expires_at,
        reason: req.reason,
        payload: req.evidence,
        created_at: req.now,
    })
    .await?;

    Ok(IssuedConfirmation {
        confirmation_id,
        token,
        expires_at,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationReceipt {
    pub ok: bool,
    pub decision_id: i64,
    pub user_id: String,
    pub confirmed: bool,
    pub confirmation_id: Uuid,
    pub confirmed_at: DateTime<Utc>,
    pub message: String,
}

/// Consume a token and mark its decision confirmed, atomically.
///
/// Every mismatch (wrong token, wrong user or decision, expired, already
/// consumed) yields the same [`ContinuityError::ConfirmationInvalid`].
pub async fn consume(
    store: &Store,
    decision_id: i64,
    user_id: &str,
    token: &str,
    now: DateTime<Utc>,
) -> Result<ConfirmationReceipt> {
    let mut tx = store.begin().await?;
    let mut repo = Repository::new(&mut tx);

    let Some(confirmation_id) = repo
        .consume_confirmation(decision_id, user_id, &hash_token(token), now)
        .await?
    else {
        warn!(decision_id, user_id, "rejected high-risk confirmation attempt");
        return Err(ContinuityError::ConfirmationInvalid);
    };

    if !repo
        .mark_decision_confirmed(decision_id, user_id, confirmation_id, now)
        .await?
    {
        return Err(ContinuityError::not_found("decision", decision_id));
    }
    tx.commit().await?;

    info!(decision_id, user_id, %confirmation_id, "high-risk decision confirmed");
    Ok(ConfirmationReceipt {
        ok: true,
        decision_id,
        user_id: user_id.to_string(),
        confirmed: true,
        confirmation_id,
        confirmed_at: now,
        message: "high risk decision confirmed".into(),
    })
}
