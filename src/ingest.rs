//! Harvest orchestration.
//!
//! Query contexts are processed one after another. For each one:
//! ledger `begin` → session (fetch + filter) → sink commit → ledger `end`.
//! Failures stay scoped to the query context that raised them; the next
//! context always runs.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::export::ExportWriter;
use crate::extract::ListingExtractor;
use crate::fetch::{FetchPolicy, Termination};
use crate::identity::IdentityExtractor;
use crate::ledger::{RunId, RunLedger};
use crate::models::QueryContext;
use crate::retention;
use crate::session::IngestionSession;
use crate::sink::{CommitResult, TransactionalSink};
use crate::source::PageSource;

#[derive(Debug, Clone)]
pub struct HarvestOptions {
    /// Restrict the run to the query with these keywords.
    pub only_query: Option<String>,
    /// Archive and clear yesterday's listings before harvesting.
    pub rotate: bool,
    /// Override the configured fetch policy (tests use zero delays).
    pub policy: Option<FetchPolicy>,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            only_query: None,
            rotate: true,
            policy: None,
        }
    }
}

/// Outcome of one query context.
#[derive(Debug)]
pub struct QueryReport {
    pub query: QueryContext,
    pub run_id: Option<RunId>,
    pub finalized: usize,
    pub committed: u64,
    pub skipped: BTreeMap<&'static str, usize>,
    pub termination: Option<Termination>,
    pub partial: bool,
    pub artifact: Option<PathBuf>,
    pub error: Option<String>,
}

impl QueryReport {
    fn failed(query: QueryContext, error: String) -> Self {
        Self {
            query,
            run_id: None,
            finalized: 0,
            committed: 0,
            skipped: BTreeMap::new(),
            termination: None,
            partial: false,
            artifact: None,
            error: Some(error),
        }
    }
}

pub async fn run_harvest(
    config: &Config,
    pool: &SqlitePool,
    source: &dyn PageSource,
    exporter: &dyn ExportWriter,
    options: &HarvestOptions,
    now: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<Vec<QueryReport>> {
    let mut queries = config.query_contexts();
    if let Some(only) = &options.only_query {
        queries.retain(|q| q.keywords.eq_ignore_ascii_case(only));
        if queries.is_empty() {
            bail!("No configured query matches '{}'", only);
        }
    }
    if queries.is_empty() {
        bail!("No queries configured. Add at least one [[queries]] entry.");
    }

    if options.rotate {
        if let Err(e) =
            retention::rotate(pool, now.date_naive(), config.retention.history_days).await
        {
            warn!(error = %format!("{:#}", e), "rotation failed, harvesting without it");
        }
    }

    let extractor = ListingExtractor::new()?;
    let identity = IdentityExtractor::from_config(&config.source)?;
    let policy = options
        .policy
        .clone()
        .unwrap_or_else(|| FetchPolicy::from_config(&config.fetch));
    let session = IngestionSession::new(
        source,
        exporter,
        &extractor,
        &identity,
        &policy,
        config.filter.window(),
    );
    let sink = TransactionalSink::new(pool, exporter, source.name());
    let ledger = RunLedger::new(pool.clone());

    let mut reports = Vec::with_capacity(queries.len());
    for query in queries {
        if cancel.is_cancelled() {
            warn!(query = %query, "cancelled, skipping remaining queries");
            break;
        }
        let report =
            harvest_query(&query, &session, &sink, &ledger, source.name(), now, cancel).await;
        reports.push(report);
    }

    Ok(reports)
}

async fn harvest_query(
    query: &QueryContext,
    session: &IngestionSession<'_>,
    sink: &TransactionalSink<'_>,
    ledger: &RunLedger,
    source_name: &str,
    now: DateTime<Utc>,
    cancel: &CancellationToken,
) -> QueryReport {
    let started = Instant::now();
    let run_id = match ledger.begin(query, source_name, now).await {
        Ok(id) => id,
        Err(e) => {
            error!(query = %query, error = %e, "could not open run ledger entry");
            return QueryReport::failed(query.clone(), format!("ledger: {:#}", e));
        }
    };

    let session_report = session.run(query, now, cancel).await;
    let result = sink
        .commit(query, &session_report.batch, now, cancel)
        .await;
    let committed = result.committed_count();

    let elapsed =
        chrono::Duration::from_std(started.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
    let ended = now + elapsed;
    if let Err(e) = ledger.end(&run_id, committed, ended).await {
        error!(run_id = %run_id, error = %e, "could not close run ledger entry");
    }

    let error = match &result {
        CommitResult::RolledBack { error, .. } => Some(error.to_string()),
        CommitResult::Committed { .. } => None,
    };
    if error.is_none() {
        info!(query = %query, committed, "query complete");
    }

    QueryReport {
        query: query.clone(),
        run_id: Some(run_id),
        finalized: session_report.batch.len(),
        committed,
        skipped: session_report.skip_counts(),
        partial: session_report.is_partial(),
        termination: session_report.fetch.terminal.clone(),
        artifact: result.artifact().cloned(),
        error,
    }
}
