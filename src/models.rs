//! Core data models used throughout the harvester.
//!
//! These types represent the listings, identifiers, and run records that
//! flow through the fetch → filter → commit pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Provenance written to `created_by` columns.
pub const CREATED_BY: &str = "SCRAPER";

/// One keyword/location combination harvested independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryContext {
    pub keywords: String,
    pub location: String,
}

impl QueryContext {
    pub fn new(keywords: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            keywords: keywords.into(),
            location: location.into(),
        }
    }

    /// Keywords with all whitespace removed, used to name artifacts.
    pub fn slug(&self) -> String {
        self.keywords.split_whitespace().collect()
    }
}

impl fmt::Display for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.keywords)
    }
}

/// Fields extracted from one listing element of a page.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub title: String,
    pub organization: String,
    pub location: String,
    /// ISO-8601 posting timestamp, absent when the listing carried none.
    pub posted_at: Option<String>,
    pub source_link: String,
    pub secondary_link: Option<String>,
}

/// Stable identifier of a listing, derived from its source link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A listing that survived identity, dedup, and recency checks.
///
/// Immutable once built; this is the unit written by the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedRecord {
    pub id: RecordId,
    pub query: QueryContext,
    pub title: String,
    pub organization: String,
    pub location: String,
    pub posted_at: String,
    pub source_link: String,
    pub secondary_link: String,
}

/// Why a raw listing was dropped before reaching the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("listing is missing its {0}")]
    MissingField(&'static str),
    #[error("no record id in link: {0}")]
    NoIdentifier(String),
    #[error("duplicate record {0}")]
    Duplicate(RecordId),
    #[error("record {0} is outside the recency window")]
    Stale(RecordId),
}

impl SkipReason {
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::MissingField(_) => "missing_field",
            SkipReason::NoIdentifier(_) => "no_identifier",
            SkipReason::Duplicate(_) => "duplicate",
            SkipReason::Stale(_) => "stale",
        }
    }
}

/// Outcome of pushing one raw listing through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Accepted(FinalizedRecord),
    Skip(SkipReason),
}

/// One row of the run ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub query: String,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_count: i64,
}
