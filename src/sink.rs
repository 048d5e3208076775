//! Transactional commit of a finalized batch.
//!
//! Relational writes are all-or-nothing: one transaction per query
//! context batch, rolled back on the first failing statement. The export
//! artifact is written after every upsert has succeeded and just before
//! the commit. It is NOT covered by the transaction: if the commit itself
//! fails, the artifact stays behind and is replaced by the next successful
//! run. A cancelled or failed batch never leaves an artifact, because the
//! next day's dedup baseline is read from it.

use chrono::{DateTime, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::export::ExportWriter;
use crate::models::{FinalizedRecord, QueryContext, CREATED_BY};

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("export failed: {0:#}")]
    Export(anyhow::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cancelled after {written} of {total} records")]
    Cancelled { written: usize, total: usize },
}

#[derive(Debug)]
pub enum CommitResult {
    Committed {
        count: u64,
        artifact: Option<PathBuf>,
    },
    RolledBack {
        error: CommitError,
        artifact: Option<PathBuf>,
    },
}

impl CommitResult {
    /// Records durably committed; zero after a rollback.
    pub fn committed_count(&self) -> u64 {
        match self {
            CommitResult::Committed { count, .. } => *count,
            CommitResult::RolledBack { .. } => 0,
        }
    }

    pub fn artifact(&self) -> Option<&PathBuf> {
        match self {
            CommitResult::Committed { artifact, .. } | CommitResult::RolledBack { artifact, .. } => {
                artifact.as_ref()
            }
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, CommitResult::Committed { .. })
    }
}

pub struct TransactionalSink<'a> {
    pool: &'a SqlitePool,
    exporter: &'a dyn ExportWriter,
    source: &'a str,
}

impl<'a> TransactionalSink<'a> {
    pub fn new(pool: &'a SqlitePool, exporter: &'a dyn ExportWriter, source: &'a str) -> Self {
        Self {
            pool,
            exporter,
            source,
        }
    }

    /// Upsert and export `batch`. Cancellation is honoured before the first
    /// upsert and between upserts, and always results in a rollback with no
    /// artifact written.
    pub async fn commit(
        &self,
        query: &QueryContext,
        batch: &[FinalizedRecord],
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> CommitResult {
        if batch.is_empty() {
            return CommitResult::Committed {
                count: 0,
                artifact: None,
            };
        }

        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                return CommitResult::RolledBack {
                    error: e.into(),
                    artifact: None,
                }
            }
        };

        let mut artifact = None;
        let outcome = self
            .write_all(&mut tx, query, batch, now.date_naive(), now, cancel, &mut artifact)
            .await;

        match outcome {
            Ok(()) => match tx.commit().await {
                Ok(()) => {
                    info!(query = %query, count = batch.len(), "batch committed");
                    CommitResult::Committed {
                        count: batch.len() as u64,
                        artifact,
                    }
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "commit failed");
                    CommitResult::RolledBack {
                        error: e.into(),
                        artifact,
                    }
                }
            },
            Err(error) => {
                if let Err(e) = tx.rollback().await {
                    warn!(query = %query, error = %e, "explicit rollback failed, dropping transaction");
                }
                warn!(query = %query, error = %error, "batch rolled back");
                CommitResult::RolledBack { error, artifact }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_all(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        query: &QueryContext,
        batch: &[FinalizedRecord],
        day: NaiveDate,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
        artifact: &mut Option<PathBuf>,
    ) -> Result<(), CommitError> {
        for (written, record) in batch.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(CommitError::Cancelled {
                    written,
                    total: batch.len(),
                });
            }
            upsert_listing(tx, record, self.source, now).await?;
        }

        let path = self
            .exporter
            .write(query, day, batch)
            .map_err(CommitError::Export)?;
        *artifact = Some(path);
        Ok(())
    }
}

fn content_hash(record: &FinalizedRecord) -> String {
    let mut hasher = Sha256::new();
    for field in [
        &record.title,
        &record.organization,
        &record.location,
        &record.posted_at,
        &record.source_link,
        &record.secondary_link,
    ] {
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

async fn upsert_listing(
    tx: &mut Transaction<'_, Sqlite>,
    record: &FinalizedRecord,
    source: &str,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let existing_id: Option<String> = sqlx::query_scalar(
        "SELECT id FROM listings WHERE source = ? AND query = ? AND record_id = ?",
    )
    .bind(source)
    .bind(&record.query.keywords)
    .bind(record.id.as_str())
    .fetch_optional(&mut **tx)
    .await?;

    let id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    sqlx::query(
        r#"
        INSERT INTO listings (id, record_id, query, title, organization, location, posted_at, source_link, secondary_link, source, content_hash, created_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source, query, record_id) DO UPDATE SET
            title = excluded.title,
            organization = excluded.organization,
            location = excluded.location,
            posted_at = excluded.posted_at,
            source_link = excluded.source_link,
            secondary_link = excluded.secondary_link,
            content_hash = excluded.content_hash,
            updated_at = excluded.updated_at
        WHERE listings.content_hash != excluded.content_hash
        "#,
    )
    .bind(&id)
    .bind(record.id.as_str())
    .bind(&record.query.keywords)
    .bind(&record.title)
    .bind(&record.organization)
    .bind(&record.location)
    .bind(&record.posted_at)
    .bind(&record.source_link)
    .bind(&record.secondary_link)
    .bind(source)
    .bind(content_hash(record))
    .bind(CREATED_BY)
    .bind(now.timestamp())
    .bind(now.timestamp())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::JsonExporter;
    use crate::migrate::run_migrations;
    use crate::models::RecordId;
    use chrono::TimeZone;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    fn record(id: &str) -> FinalizedRecord {
        FinalizedRecord {
            id: RecordId::new(id),
            query: QueryContext::new("Data Engineer", "United States"),
            title: "Data Engineer".into(),
            organization: "Acme".into(),
            location: "Remote".into(),
            posted_at: "2025-03-09".into(),
            source_link: format!("https://www.linkedin.com/jobs/view/x-{}", id),
            secondary_link: format!("https://www.linkedin.com/jobs/view/{}", id),
        }
    }

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap()
    }

    async fn updated_at(pool: &SqlitePool, record_id: &str) -> i64 {
        sqlx::query_scalar("SELECT updated_at FROM listings WHERE record_id = ?")
            .bind(record_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_cancelled_commit_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let pool = pool().await;
        let exporter = JsonExporter::new(tmp.path());
        let sink = TransactionalSink::new(&pool, &exporter, "LinkedIn");
        let query = QueryContext::new("Data Engineer", "United States");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = sink
            .commit(&query, &[record("1"), record("2")], at(9), &cancel)
            .await;
        assert!(matches!(
            result,
            CommitResult::RolledBack {
                error: CommitError::Cancelled { written: 0, total: 2 },
                artifact: None,
            }
        ));
        assert!(!exporter.artifact_path(&query, at(9).date_naive()).exists());
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM listings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_unchanged_record_keeps_updated_at() {
        let tmp = TempDir::new().unwrap();
        let pool = pool().await;
        let exporter = JsonExporter::new(tmp.path());
        let sink = TransactionalSink::new(&pool, &exporter, "LinkedIn");
        let query = QueryContext::new("Data Engineer", "United States");
        let cancel = CancellationToken::new();

        let first = sink.commit(&query, &[record("1")], at(9), &cancel).await;
        assert_eq!(first.committed_count(), 1);
        assert!(first.artifact().is_some_and(|p| p.exists()));

        sink.commit(&query, &[record("1")], at(10), &cancel).await;
        assert_eq!(updated_at(&pool, "1").await, at(9).timestamp());

        let mut retitled = record("1");
        retitled.title = "Senior Data Engineer".into();
        sink.commit(&query, &[retitled], at(11), &cancel).await;
        assert_eq!(updated_at(&pool, "1").await, at(11).timestamp());

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM listings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_content_hash_changes_with_fields() {
        let record = record("1");
        let mut moved = record.clone();
        moved.location = "Austin, TX".into();
        assert_eq!(content_hash(&record), content_hash(&record.clone()));
        assert_ne!(content_hash(&record), content_hash(&moved));
    }

    #[test]
    fn test_rolled_back_counts_zero() {
        let result = CommitResult::RolledBack {
            error: CommitError::Cancelled {
                written: 1,
                total: 3,
            },
            artifact: None,
        };
        assert_eq!(result.committed_count(), 0);
        assert!(!result.is_committed());
    }
}
