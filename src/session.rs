//! One query context, end to end, up to a finalized batch.
//!
//! The session loads the dedup baseline, drives the paginator, and pushes
//! every listing through identity → dedup → recency. Each listing yields a
//! [`RecordOutcome`]; skips are collected rather than raised so a bad
//! listing never ends the session.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dedup::{load_previous_ids, DedupIndex};
use crate::export::ExportWriter;
use crate::extract::ListingExtractor;
use crate::fetch::{FetchPolicy, FetchState, Paginator};
use crate::identity::IdentityExtractor;
use crate::models::{FinalizedRecord, QueryContext, RawRecord, RecordId, RecordOutcome, SkipReason};
use crate::recency::is_recent;
use crate::source::PageSource;

pub struct IngestionSession<'a> {
    source: &'a dyn PageSource,
    exporter: &'a dyn ExportWriter,
    extractor: &'a ListingExtractor,
    identity: &'a IdentityExtractor,
    policy: &'a FetchPolicy,
    recency_window: Duration,
}

/// Everything a finished session produced.
#[derive(Debug)]
pub struct SessionReport {
    pub query: QueryContext,
    pub batch: Vec<FinalizedRecord>,
    pub skipped: Vec<SkipReason>,
    pub fetch: FetchState,
    pub baseline: usize,
    pub seen_today: HashSet<RecordId>,
}

impl SessionReport {
    /// Whether the fetch loop stopped before the source ran out.
    pub fn is_partial(&self) -> bool {
        self.fetch
            .terminal
            .as_ref()
            .is_some_and(|t| t.is_partial())
    }

    pub fn skip_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for reason in &self.skipped {
            *counts.entry(reason.kind()).or_insert(0) += 1;
        }
        counts
    }
}

impl<'a> IngestionSession<'a> {
    pub fn new(
        source: &'a dyn PageSource,
        exporter: &'a dyn ExportWriter,
        extractor: &'a ListingExtractor,
        identity: &'a IdentityExtractor,
        policy: &'a FetchPolicy,
        recency_window: Duration,
    ) -> Self {
        Self {
            source,
            exporter,
            extractor,
            identity,
            policy,
            recency_window,
        }
    }

    pub async fn run(
        &self,
        query: &QueryContext,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> SessionReport {
        let baseline = load_previous_ids(self.exporter, self.identity, query, now.date_naive());
        info!(query = %query, baseline = baseline.len(), "starting session");

        let mut dedup = DedupIndex::new(baseline);
        let mut batch = Vec::new();
        let mut skipped = Vec::new();
        let mut paginator = Paginator::new(self.source, self.extractor, query, self.policy);

        while let Some(page) = paginator.next_page(cancel).await {
            for listing in page.listings {
                match process_listing(
                    listing,
                    query,
                    self.identity,
                    &mut dedup,
                    now,
                    self.recency_window,
                ) {
                    RecordOutcome::Accepted(record) => batch.push(record),
                    RecordOutcome::Skip(reason) => {
                        debug!(query = %query, page = page.index, reason = %reason, "listing skipped");
                        skipped.push(reason);
                    }
                }
            }
        }

        let fetch = paginator.into_state();
        let report = SessionReport {
            query: query.clone(),
            batch,
            skipped,
            fetch,
            baseline: dedup.baseline_len(),
            seen_today: dedup.seen_today().clone(),
        };

        if report.is_partial() {
            warn!(
                query = %query,
                records = report.batch.len(),
                termination = ?report.fetch.terminal,
                "session ended early, batch is partial"
            );
        } else {
            info!(
                query = %query,
                records = report.batch.len(),
                skipped = report.skipped.len(),
                pages = report.fetch.page,
                "session complete"
            );
        }
        report
    }
}

/// Push one extracted listing through identity, dedup, and recency.
///
/// Dedup runs before recency, so a stale listing still claims its id for
/// the rest of the run.
pub fn process_listing(
    listing: Result<RawRecord, SkipReason>,
    query: &QueryContext,
    identity: &IdentityExtractor,
    dedup: &mut DedupIndex,
    now: DateTime<Utc>,
    window: Duration,
) -> RecordOutcome {
    let raw = match listing {
        Ok(raw) => raw,
        Err(reason) => return RecordOutcome::Skip(reason),
    };

    let Some(id) = identity.identify(&raw.source_link) else {
        return RecordOutcome::Skip(SkipReason::NoIdentifier(raw.source_link));
    };

    if dedup.seen_or_mark(&id) {
        return RecordOutcome::Skip(SkipReason::Duplicate(id));
    }

    if !is_recent(raw.posted_at.as_deref(), now, window) {
        return RecordOutcome::Skip(SkipReason::Stale(id));
    }

    let secondary_link = raw
        .secondary_link
        .unwrap_or_else(|| identity.canonical_link(&id));

    RecordOutcome::Accepted(FinalizedRecord {
        id,
        query: query.clone(),
        title: raw.title,
        organization: raw.organization,
        location: raw.location,
        posted_at: raw.posted_at.unwrap_or_default(),
        source_link: raw.source_link,
        secondary_link,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn raw(id: u32, posted: Option<&str>) -> RawRecord {
        RawRecord {
            title: format!("Role {}", id),
            organization: "Acme".into(),
            location: "Remote".into(),
            posted_at: posted.map(str::to_string),
            source_link: format!("https://www.linkedin.com/jobs/view/role-{}", id),
            secondary_link: None,
        }
    }

    fn run(listing: Result<RawRecord, SkipReason>, dedup: &mut DedupIndex) -> RecordOutcome {
        let identity = IdentityExtractor::from_config(&SourceConfig::default()).unwrap();
        let query = QueryContext::new("Data Engineer", "United States");
        process_listing(listing, &query, &identity, dedup, now(), Duration::days(7))
    }

    #[test]
    fn test_accepts_recent_new_listing() {
        let mut dedup = DedupIndex::default();
        match run(Ok(raw(102, Some("2025-03-09"))), &mut dedup) {
            RecordOutcome::Accepted(record) => {
                assert_eq!(record.id.as_str(), "102");
                assert_eq!(record.secondary_link, "https://www.linkedin.com/jobs/view/102");
                assert_eq!(record.query.keywords, "Data Engineer");
            }
            other => panic!("expected accept, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_within_run() {
        let mut dedup = DedupIndex::default();
        assert!(matches!(
            run(Ok(raw(7, Some("2025-03-09"))), &mut dedup),
            RecordOutcome::Accepted(_)
        ));
        assert_eq!(
            run(Ok(raw(7, Some("2025-03-09"))), &mut dedup),
            RecordOutcome::Skip(SkipReason::Duplicate(RecordId::new("7")))
        );
    }

    #[test]
    fn test_stale_listing_still_claims_id() {
        let mut dedup = DedupIndex::default();
        assert_eq!(
            run(Ok(raw(9, Some("2024-01-01"))), &mut dedup),
            RecordOutcome::Skip(SkipReason::Stale(RecordId::new("9")))
        );
        assert!(dedup.seen_today().contains(&RecordId::new("9")));
    }

    #[test]
    fn test_unidentifiable_link_skipped() {
        let mut dedup = DedupIndex::default();
        let mut listing = raw(1, Some("2025-03-09"));
        listing.source_link = "https://www.linkedin.com/company/acme".into();
        assert!(matches!(
            run(Ok(listing), &mut dedup),
            RecordOutcome::Skip(SkipReason::NoIdentifier(_))
        ));
        assert!(dedup.seen_today().is_empty());
    }

    #[test]
    fn test_extraction_skip_passes_through() {
        let mut dedup = DedupIndex::default();
        assert_eq!(
            run(Err(SkipReason::MissingField("title")), &mut dedup),
            RecordOutcome::Skip(SkipReason::MissingField("title"))
        );
    }

    #[test]
    fn test_missing_timestamp_is_stale() {
        let mut dedup = DedupIndex::default();
        assert_eq!(
            run(Ok(raw(5, None)), &mut dedup),
            RecordOutcome::Skip(SkipReason::Stale(RecordId::new("5")))
        );
    }
}
