//! Run ledger.
//!
//! Every query context attempt is bracketed by [`RunLedger::begin`] and
//! [`RunLedger::end`], whatever happened to its batch. Ledger writes run
//! on the pool directly, outside any sink transaction, so a rollback never
//! erases the record of an attempt.

use anyhow::{bail, Result};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{Row, SqlitePool};
use std::fmt;
use uuid::Uuid;

use crate::models::{QueryContext, RunRecord, CREATED_BY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunId(String);

impl RunId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
pub struct RunLedger {
    pool: SqlitePool,
}

impl RunLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn begin(
        &self,
        query: &QueryContext,
        source: &str,
        now: DateTime<Utc>,
    ) -> Result<RunId> {
        let run_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO scraper_runs (run_id, query, source, run_date, started_at, ended_at, total_count, created_by)
            VALUES (?, ?, ?, ?, ?, NULL, 0, ?)
            "#,
        )
        .bind(&run_id)
        .bind(&query.keywords)
        .bind(source)
        .bind(now.date_naive().to_string())
        .bind(now.timestamp())
        .bind(CREATED_BY)
        .execute(&self.pool)
        .await?;

        tracing::info!(run_id = %run_id, query = %query, "run started");
        Ok(RunId(run_id))
    }

    /// Close a run. A run can be closed exactly once.
    pub async fn end(&self, run_id: &RunId, count: u64, now: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE scraper_runs SET ended_at = ?, total_count = ? \
             WHERE run_id = ? AND ended_at IS NULL",
        )
        .bind(now.timestamp())
        .bind(count as i64)
        .bind(run_id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("Run {} is unknown or already closed", run_id);
        }

        tracing::info!(run_id = %run_id, total = count, "run ended");
        Ok(())
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query(
            "SELECT run_id, query, source, started_at, ended_at, total_count \
             FROM scraper_runs ORDER BY started_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| RunRecord {
                run_id: row.get("run_id"),
                query: row.get("query"),
                source: row.get("source"),
                started_at: from_unix(row.get("started_at")),
                ended_at: row.get::<Option<i64>, _>("ended_at").map(from_unix),
                total_count: row.get("total_count"),
            })
            .collect())
    }
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}
