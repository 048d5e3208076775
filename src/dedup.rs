//! Cross-run and in-run deduplication.
//!
//! The baseline is whatever the previous day's artifact for the same query
//! context contains. It is loaded once and never mutated; identifiers seen
//! during the current run accumulate separately.

use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::export::{read_artifact, ExportWriter};
use crate::identity::IdentityExtractor;
use crate::models::{QueryContext, RecordId};

/// Identifier sets owned by a single session.
#[derive(Debug, Default)]
pub struct DedupIndex {
    seen_today: HashSet<RecordId>,
    seen_historically: HashSet<RecordId>,
}

impl DedupIndex {
    pub fn new(seen_historically: HashSet<RecordId>) -> Self {
        Self {
            seen_today: HashSet::new(),
            seen_historically,
        }
    }

    /// Returns `true` if `id` was already seen (today or historically).
    /// Otherwise marks it as seen today and returns `false`.
    pub fn seen_or_mark(&mut self, id: &RecordId) -> bool {
        if self.seen_historically.contains(id) {
            return true;
        }
        !self.seen_today.insert(id.clone())
    }

    pub fn seen_today(&self) -> &HashSet<RecordId> {
        &self.seen_today
    }

    pub fn baseline_len(&self) -> usize {
        self.seen_historically.len()
    }
}

/// Load the identifiers present in the artifact for `query` on the day
/// before `today`.
///
/// Never fails: a missing, unreadable, or malformed artifact yields an
/// empty baseline.
pub fn load_previous_ids(
    exporter: &dyn ExportWriter,
    identity: &IdentityExtractor,
    query: &QueryContext,
    today: NaiveDate,
) -> HashSet<RecordId> {
    let Some(yesterday) = today.pred_opt() else {
        return HashSet::new();
    };
    let path = exporter.artifact_path(query, yesterday);
    if !path.exists() {
        debug!(query = %query, path = %path.display(), "no previous artifact");
        return HashSet::new();
    }

    match read_artifact(&path) {
        Ok(rows) => rows
            .iter()
            .filter_map(|row| identity.identify(&row.source_link))
            .collect(),
        Err(e) => {
            warn!(query = %query, error = %e, "ignoring unreadable previous artifact");
            HashSet::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use crate::export::JsonExporter;
    use crate::models::FinalizedRecord;
    use tempfile::TempDir;

    fn ids(values: &[&str]) -> HashSet<RecordId> {
        values.iter().map(|v| RecordId::new(*v)).collect()
    }

    #[test]
    fn test_seen_or_mark_marks_once() {
        let mut index = DedupIndex::new(HashSet::new());
        let id = RecordId::new("102");
        assert!(!index.seen_or_mark(&id));
        assert!(index.seen_or_mark(&id));
        assert_eq!(index.seen_today().len(), 1);
    }

    #[test]
    fn test_historical_ids_are_duplicates_and_not_marked() {
        let mut index = DedupIndex::new(ids(&["101"]));
        assert!(index.seen_or_mark(&RecordId::new("101")));
        assert!(index.seen_today().is_empty());
        assert_eq!(index.baseline_len(), 1);
    }

    fn fixture() -> (TempDir, JsonExporter, IdentityExtractor, QueryContext, NaiveDate) {
        let tmp = TempDir::new().unwrap();
        let exporter = JsonExporter::new(tmp.path());
        let identity = IdentityExtractor::from_config(&SourceConfig::default()).unwrap();
        let query = QueryContext::new("Data Engineer", "United States");
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        (tmp, exporter, identity, query, today)
    }

    #[test]
    fn test_load_from_previous_day_artifact() {
        let (_tmp, exporter, identity, query, today) = fixture();
        let record = FinalizedRecord {
            id: RecordId::new("101"),
            query: query.clone(),
            title: "Data Engineer".into(),
            organization: "Acme".into(),
            location: "Remote".into(),
            posted_at: "2025-03-09".into(),
            source_link: "https://www.linkedin.com/jobs/view/data-engineer-101".into(),
            secondary_link: "https://www.linkedin.com/jobs/view/101".into(),
        };
        exporter
            .write(&query, today.pred_opt().unwrap(), &[record])
            .unwrap();

        let loaded = load_previous_ids(&exporter, &identity, &query, today);
        assert_eq!(loaded, ids(&["101"]));
    }

    #[test]
    fn test_load_ignores_same_day_artifact() {
        let (_tmp, exporter, identity, query, today) = fixture();
        exporter.write(&query, today, &[]).unwrap();
        assert!(load_previous_ids(&exporter, &identity, &query, today).is_empty());
    }

    #[test]
    fn test_load_missing_artifact_is_empty() {
        let (_tmp, exporter, identity, query, today) = fixture();
        assert!(load_previous_ids(&exporter, &identity, &query, today).is_empty());
    }

    #[test]
    fn test_load_corrupt_artifact_is_empty() {
        let (_tmp, exporter, identity, query, today) = fixture();
        let path = exporter.artifact_path(&query, today.pred_opt().unwrap());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "\u{0}garbage").unwrap();
        assert!(load_previous_ids(&exporter, &identity, &query, today).is_empty());
    }
}
