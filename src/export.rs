//! Export artifacts.
//!
//! One artifact is written per (query context, calendar day). The default
//! writer produces a pretty JSON array, overwriting any artifact already
//! present for the same day so re-runs stay idempotent. The same rows are
//! read back by the dedup index as the previous day's baseline.
//!
//! This module also backs `harvest export`, which dumps the current
//! `listings` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};

use crate::models::{FinalizedRecord, QueryContext};

/// One exported listing. Column set matches the relational `listings` row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportRow {
    pub title: String,
    pub organization: String,
    pub location: String,
    pub posted_at: String,
    pub query: String,
    pub source_link: String,
    pub secondary_link: String,
}

impl From<&FinalizedRecord> for ExportRow {
    fn from(record: &FinalizedRecord) -> Self {
        Self {
            title: record.title.clone(),
            organization: record.organization.clone(),
            location: record.location.clone(),
            posted_at: record.posted_at.clone(),
            query: record.query.keywords.clone(),
            source_link: record.source_link.clone(),
            secondary_link: record.secondary_link.clone(),
        }
    }
}

/// Destination for a finished batch.
///
/// Implementations must overwrite rather than append: writing the same
/// (query, day) twice leaves exactly one artifact with the latest batch.
pub trait ExportWriter: Send + Sync {
    fn write(
        &self,
        query: &QueryContext,
        day: NaiveDate,
        records: &[FinalizedRecord],
    ) -> Result<PathBuf>;

    /// Location of the artifact for (query, day), whether or not it exists.
    fn artifact_path(&self, query: &QueryContext, day: NaiveDate) -> PathBuf;
}

/// Writes `<root>/<Query>/<Query>_<YYYYMMDD>.json`.
#[derive(Debug, Clone)]
pub struct JsonExporter {
    root: PathBuf,
}

impl JsonExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ExportWriter for JsonExporter {
    fn write(
        &self,
        query: &QueryContext,
        day: NaiveDate,
        records: &[FinalizedRecord],
    ) -> Result<PathBuf> {
        let path = self.artifact_path(query, day);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let rows: Vec<ExportRow> = records.iter().map(ExportRow::from).collect();
        let json = serde_json::to_string_pretty(&rows)?;

        // Write-then-rename so a crash never leaves a truncated artifact.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        Ok(path)
    }

    fn artifact_path(&self, query: &QueryContext, day: NaiveDate) -> PathBuf {
        let slug = query.slug();
        self.root
            .join(&slug)
            .join(format!("{}_{}.json", slug, day.format("%Y%m%d")))
    }
}

/// Read an artifact written by [`JsonExporter`].
pub fn read_artifact(path: &Path) -> Result<Vec<ExportRow>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read artifact: {}", path.display()))?;
    let rows = serde_json::from_str(&content)
        .with_context(|| format!("Malformed artifact: {}", path.display()))?;
    Ok(rows)
}

#[derive(Serialize)]
struct ListingDump {
    id: String,
    record_id: String,
    query: String,
    title: String,
    organization: String,
    location: String,
    posted_at: String,
    source_link: String,
    secondary_link: String,
    source: String,
    created_at: i64,
}

/// Dump the current `listings` table as JSON.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn export_listings(pool: &SqlitePool, output: Option<&Path>) -> Result<usize> {
    let rows = sqlx::query(
        "SELECT id, record_id, query, title, organization, location, posted_at, \
         source_link, secondary_link, source, created_at \
         FROM listings ORDER BY query, posted_at DESC, record_id",
    )
    .fetch_all(pool)
    .await?;

    let listings: Vec<ListingDump> = rows
        .iter()
        .map(|row| ListingDump {
            id: row.get("id"),
            record_id: row.get("record_id"),
            query: row.get("query"),
            title: row.get("title"),
            organization: row.get("organization"),
            location: row.get("location"),
            posted_at: row.get("posted_at"),
            source_link: row.get("source_link"),
            secondary_link: row.get("secondary_link"),
            source: row.get("source"),
            created_at: row.get("created_at"),
        })
        .collect();

    let count = listings.len();
    let json = serde_json::to_string_pretty(&listings)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)?;
            eprintln!("Exported {} listings to {}", count, path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordId;
    use tempfile::TempDir;

    fn record(id: &str, title: &str) -> FinalizedRecord {
        FinalizedRecord {
            id: RecordId::new(id),
            query: QueryContext::new("Data Engineer", "United States"),
            title: title.to_string(),
            organization: "Acme".to_string(),
            location: "Remote".to_string(),
            posted_at: "2025-03-09".to_string(),
            source_link: format!("https://www.linkedin.com/jobs/view/x-{}", id),
            secondary_link: format!("https://www.linkedin.com/jobs/view/{}", id),
        }
    }

    #[test]
    fn test_artifact_path_naming() {
        let exporter = JsonExporter::new("/data/out");
        let q = QueryContext::new("Data Engineer", "United States");
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(
            exporter.artifact_path(&q, day),
            PathBuf::from("/data/out/DataEngineer/DataEngineer_20250310.json")
        );
    }

    #[test]
    fn test_write_overwrites_same_day() {
        let tmp = TempDir::new().unwrap();
        let exporter = JsonExporter::new(tmp.path());
        let q = QueryContext::new("Data Engineer", "United States");
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();

        exporter
            .write(&q, day, &[record("1", "first"), record("2", "second")])
            .unwrap();
        let path = exporter.write(&q, day, &[record("3", "third")]).unwrap();

        let rows = read_artifact(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "third");
        assert_eq!(rows[0].query, "Data Engineer");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_read_malformed_artifact_errors() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(read_artifact(&path).is_err());
    }
}
