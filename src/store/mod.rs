//! Transactional SQLite persistence.
//!
//! [`Store`] owns the pool. Every unit of work opens a transaction with
//! [`Store::begin`] and drives it through a [`Repository`]; dropping the
//! transaction without `commit` rolls everything back.

mod records;
mod repository;
mod schema;

pub use records::{
    ConfirmationRecord, DecisionRecord, FailureOutcome, MemoryEntryVector, NewConfirmation,
    NewDecision, NewMemoryEntry, OutcomeRecord, OutcomeUpdate, StateEvidence,
};
pub use repository::Repository;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;

/// How long a connection waits on a held write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) a file-backed database.
    pub async fn open(path: &Path, max_connections: u32) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create database directory {}", parent.display()))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| format!("open database {}", path.display()))?;
        debug!(path = %path.display(), "opened continuity database");
        Self::with_pool(pool).await
    }

    /// Private in-memory database on a single pinned connection.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("parse in-memory database url")?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("open in-memory database")?;
        Self::with_pool(pool).await
    }

    /// Wrap an existing pool and create the schema.
    pub async fn with_pool(pool: SqlitePool) -> anyhow::Result<Self> {
        schema::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a write transaction.
    ///
    /// `BEGIN IMMEDIATE` takes the write lock up front. A deferred begin that
    /// reads first and writes later cannot wait out a concurrent writer under
    /// WAL and fails with `SQLITE_BUSY` instead.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }
}

/// Fixed-width RFC 3339 so that lexical order in SQL is chronological order.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(e.into()))
}

pub(crate) fn parse_uuid(raw: &str) -> std::result::Result<Uuid, sqlx::Error> {
    Uuid::parse_str(raw).map_err(|e| sqlx::Error::Decode(e.into()))
}
