use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePool;

const SCHEMA_META_TABLE: &str = "
CREATE TABLE IF NOT EXISTS continuity_schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";
const SCHEMA_VERSION_KEY: &str = "continuity_schema_version";
const SCHEMA_VERSION: u32 = 1;

/// Tables, in dependency order. Every statement is idempotent.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS user_state (
        user_id          TEXT PRIMARY KEY,
        axes             TEXT NOT NULL,
        main_constraint  TEXT,
        uncertainty_meta REAL NOT NULL DEFAULT 0,
        update_count     INTEGER NOT NULL DEFAULT 0,
        last_updated     TEXT
    )",
    "CREATE TABLE IF NOT EXISTS state_evidence (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id       TEXT NOT NULL,
        resource_axis TEXT NOT NULL,
        before_value  REAL NOT NULL,
        after_value   REAL NOT NULL,
        signal_type   TEXT NOT NULL,
        signal_text   TEXT NOT NULL,
        weight        REAL NOT NULL,
        confidence    REAL NOT NULL,
        created_at    TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_state_evidence_user ON state_evidence(user_id, created_at)",
    "CREATE TABLE IF NOT EXISTS memory_entries (
        entry_id        TEXT PRIMARY KEY,
        user_id         TEXT NOT NULL,
        event_class     TEXT NOT NULL,
        raw_context     TEXT NOT NULL,
        impact_vector   TEXT NOT NULL,
        axis_confidence TEXT NOT NULL,
        missing_axes    TEXT NOT NULL,
        continuity_cost REAL NOT NULL,
        irreversible    INTEGER NOT NULL,
        system_caused   INTEGER NOT NULL,
        memory_weight   REAL NOT NULL,
        memory_layer    INTEGER NOT NULL CHECK (memory_layer BETWEEN 1 AND 4),
        risk_vector     BLOB NOT NULL,
        created_at      TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_memory_entries_user ON memory_entries(user_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_memory_entries_layer
        ON memory_entries(user_id, memory_layer, created_at)",
    "CREATE TABLE IF NOT EXISTS memory_objects (
        object_id    TEXT PRIMARY KEY,
        user_id      TEXT NOT NULL,
        object_type  TEXT NOT NULL CHECK (object_type IN ('shell', 'success_path')),
        name         TEXT,
        text_index   TEXT NOT NULL,
        payload_json TEXT NOT NULL,
        confidence   TEXT NOT NULL,
        validity     TEXT NOT NULL,
        updated_at   TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_memory_objects_user
        ON memory_objects(user_id, object_type, updated_at)",
    "CREATE TABLE IF NOT EXISTS decision_log (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id             TEXT NOT NULL,
        context             TEXT NOT NULL,
        candidate_actions   TEXT NOT NULL,
        selected_action     TEXT NOT NULL,
        predicted_gain      REAL NOT NULL,
        predicted_risk      REAL NOT NULL,
        uncertainty_penalty REAL NOT NULL,
        memory_penalty      REAL NOT NULL,
        decision_score      REAL NOT NULL,
        trace_id            TEXT NOT NULL,
        created_at          TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS high_risk_confirmations (
        confirmation_id TEXT PRIMARY KEY,
        decision_id     INTEGER NOT NULL REFERENCES decision_log(id),
        user_id         TEXT NOT NULL,
        token_hash      TEXT NOT NULL,
        expires_at      TEXT NOT NULL,
        reason          TEXT NOT NULL,
        payload         TEXT NOT NULL,
        consumed_at     TEXT,
        created_at      TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_confirmations_decision
        ON high_risk_confirmations(decision_id, user_id)",
    "CREATE TABLE IF NOT EXISTS action_outcome (
        outcome_id              TEXT PRIMARY KEY,
        decision_id             INTEGER NOT NULL UNIQUE REFERENCES decision_log(id),
        user_id                 TEXT NOT NULL,
        predicted_impact_vector TEXT NOT NULL,
        predicted_cost          REAL NOT NULL,
        actual_impact_vector    TEXT,
        actual_cost             REAL,
        vector_error_l1         REAL,
        cost_error              REAL,
        continuity_failure      INTEGER NOT NULL DEFAULT 0,
        failure_type            TEXT,
        user_visible_cost       TEXT,
        preventable             INTEGER,
        created_at              TEXT NOT NULL,
        reconciled_at           TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_action_outcome_failures
        ON action_outcome(user_id, continuity_failure, created_at)",
    "CREATE TABLE IF NOT EXISTS chat_idempotency (
        user_id         TEXT NOT NULL,
        idempotency_key TEXT NOT NULL,
        request_hash    TEXT NOT NULL,
        response_json   TEXT NOT NULL,
        created_at      TEXT NOT NULL,
        PRIMARY KEY (user_id, idempotency_key)
    )",
    "CREATE TABLE IF NOT EXISTS conversation_history (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id    TEXT NOT NULL,
        session_id TEXT NOT NULL,
        role       TEXT NOT NULL,
        content    TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_conversation_session
        ON conversation_history(user_id, session_id, id)",
];

pub(super) async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    ensure_schema_version(pool).await?;
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("create continuity schema")?;
    }
    Ok(())
}

async fn ensure_schema_version(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_META_TABLE)
        .execute(pool)
        .await
        .context("create continuity_schema_meta table")?;

    let stored_version: Option<(String,)> =
        sqlx::query_as("SELECT value FROM continuity_schema_meta WHERE key = $1")
            .bind(SCHEMA_VERSION_KEY)
            .fetch_optional(pool)
            .await
            .context("load continuity schema version")?;

    if let Some((value,)) = stored_version {
        let parsed = value
            .parse::<u32>()
            .with_context(|| format!("invalid continuity schema version value: {value}"))?;
        anyhow::ensure!(
            parsed == SCHEMA_VERSION,
            "incompatible continuity schema version: stored={parsed}, expected={SCHEMA_VERSION}. \
remove the database and restart."
        );
        return Ok(());
    }

    let existing_tables: (i64,) = sqlx::query_as(
        "SELECT COUNT(*)
         FROM sqlite_master
         WHERE type = 'table'
           AND name IN ('user_state', 'decision_log', 'memory_entries')",
    )
    .fetch_one(pool)
    .await
    .context("detect unversioned continuity tables")?;

    if existing_tables.0 > 0 {
        anyhow::bail!(
            "continuity tables found without schema version metadata. \
remove the database and restart."
        );
    }

    sqlx::query("INSERT INTO continuity_schema_meta (key, value) VALUES ($1, $2)")
        .bind(SCHEMA_VERSION_KEY)
        .bind(SCHEMA_VERSION.to_string())
        .execute(pool)
        .await
        .context("persist continuity schema version")?;

    Ok(())
}
