//! TOML configuration for the harvester.
//!
//! Every tunable that the pipeline needs (query contexts, endpoint,
//! retry budget, backoff bounds, recency window) lives here and is passed
//! explicitly into the session, sink, and ledger.

use anyhow::{bail, Context, Result};
use chrono::Duration as ChronoDuration;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::QueryContext;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    pub export: ExportConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub queries: Vec<QueryConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_name")]
    pub name: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_time_filter")]
    pub time_filter: String,
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_id_pattern")]
    pub id_pattern: String,
    #[serde(default = "default_canonical_link")]
    pub canonical_link: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: default_source_name(),
            endpoint: default_endpoint(),
            location: default_location(),
            page_size: default_page_size(),
            time_filter: default_time_filter(),
            sort_by: default_sort_by(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            id_pattern: default_id_pattern(),
            canonical_link: default_canonical_link(),
        }
    }
}

fn default_source_name() -> String {
    "LinkedIn".to_string()
}
fn default_endpoint() -> String {
    "https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search".to_string()
}
fn default_location() -> String {
    "United States".to_string()
}
fn default_page_size() -> u32 {
    25
}
fn default_time_filter() -> String {
    "r86400".to_string()
}
fn default_sort_by() -> String {
    "R".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36"
        .to_string()
}
fn default_timeout_secs() -> u64 {
    45
}
fn default_id_pattern() -> String {
    r"/jobs/view/.*?-(\d+)".to_string()
}
fn default_canonical_link() -> String {
    "https://www.linkedin.com/jobs/view/{id}".to_string()
}

/// Retry and throttling policy for the fetch loop.
#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    #[serde(default = "default_rate_limit_backoff")]
    pub rate_limit_backoff_secs: [f64; 2],
    #[serde(default = "default_polite_delay")]
    pub polite_delay_secs: [f64; 2],
    #[serde(default = "default_failure_delay")]
    pub failure_delay_secs: f64,
    /// Non-2xx statuses that mean "no more pages" rather than a failure.
    #[serde(default = "default_end_of_results_statuses")]
    pub end_of_results_statuses: Vec<u16>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retry_budget: default_retry_budget(),
            rate_limit_backoff_secs: default_rate_limit_backoff(),
            polite_delay_secs: default_polite_delay(),
            failure_delay_secs: default_failure_delay(),
            end_of_results_statuses: default_end_of_results_statuses(),
        }
    }
}

fn default_retry_budget() -> u32 {
    3
}
fn default_rate_limit_backoff() -> [f64; 2] {
    [45.0, 90.0]
}
fn default_polite_delay() -> [f64; 2] {
    [1.5, 3.5]
}
fn default_failure_delay() -> f64 {
    5.0
}
fn default_end_of_results_statuses() -> Vec<u16> {
    vec![400]
}

/// Longest single wait the fetch loop accepts, in seconds.
const MAX_DELAY_SECS: f64 = 86_400.0;
/// Upper bound for day counts, keeps date arithmetic in range.
const MAX_DAYS: i64 = 36_500;

impl FetchConfig {
    pub fn rate_limit_backoff(&self) -> (Duration, Duration) {
        secs_range(self.rate_limit_backoff_secs)
    }

    pub fn polite_delay(&self) -> (Duration, Duration) {
        secs_range(self.polite_delay_secs)
    }

    pub fn failure_delay(&self) -> Duration {
        Duration::from_secs_f64(self.failure_delay_secs)
    }
}

fn secs_range(bounds: [f64; 2]) -> (Duration, Duration) {
    (
        Duration::from_secs_f64(bounds[0]),
        Duration::from_secs_f64(bounds[1]),
    )
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    #[serde(default = "default_recency_days")]
    pub recency_days: i64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            recency_days: default_recency_days(),
        }
    }
}

fn default_recency_days() -> i64 {
    7
}

impl FilterConfig {
    pub fn window(&self) -> ChronoDuration {
        ChronoDuration::days(self.recency_days)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetentionConfig {
    #[serde(default = "default_history_days")]
    pub history_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            history_days: default_history_days(),
        }
    }
}

fn default_history_days() -> i64 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    pub keywords: String,
    #[serde(default)]
    pub location: Option<String>,
}

impl Config {
    /// Resolve the configured queries into query contexts, filling in the
    /// source-wide location where a query does not override it.
    pub fn query_contexts(&self) -> Vec<QueryContext> {
        self.queries
            .iter()
            .map(|q| QueryContext {
                keywords: q.keywords.clone(),
                location: q
                    .location
                    .clone()
                    .unwrap_or_else(|| self.source.location.clone()),
            })
            .collect()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.source.page_size == 0 {
        bail!("source.page_size must be > 0");
    }

    let pattern = Regex::new(&config.source.id_pattern)
        .with_context(|| format!("Invalid source.id_pattern: {}", config.source.id_pattern))?;
    if pattern.captures_len() < 2 {
        bail!("source.id_pattern must contain a capture group for the record id");
    }
    if !config.source.canonical_link.contains("{id}") {
        bail!("source.canonical_link must contain an {{id}} placeholder");
    }

    for (name, bounds) in [
        ("fetch.rate_limit_backoff_secs", config.fetch.rate_limit_backoff_secs),
        ("fetch.polite_delay_secs", config.fetch.polite_delay_secs),
    ] {
        if !bounds.iter().all(|b| valid_delay(*b)) || bounds[1] < bounds[0] {
            bail!(
                "{} must be [min, max] with 0 <= min <= max <= {}",
                name,
                MAX_DELAY_SECS
            );
        }
    }
    if !valid_delay(config.fetch.failure_delay_secs) {
        bail!(
            "fetch.failure_delay_secs must be between 0 and {}",
            MAX_DELAY_SECS
        );
    }
    if config.fetch.end_of_results_statuses.contains(&429) {
        bail!("fetch.end_of_results_statuses must not include 429");
    }

    if !(0..=MAX_DAYS).contains(&config.filter.recency_days) {
        bail!("filter.recency_days must be between 0 and {}", MAX_DAYS);
    }
    if !(1..=MAX_DAYS).contains(&config.retention.history_days) {
        bail!("retention.history_days must be between 1 and {}", MAX_DAYS);
    }

    for q in &config.queries {
        if q.keywords.trim().is_empty() {
            bail!("queries[].keywords must not be empty");
        }
    }

    // Artifacts, listings and ledger rows are keyed by keywords, so two
    // contexts may not share them even with different locations.
    let mut seen = HashSet::new();
    for query in config.query_contexts() {
        if !seen.insert(query.slug().to_lowercase()) {
            bail!(
                "Duplicate query keywords '{}': each [[queries]] entry needs distinct keywords",
                query.keywords
            );
        }
    }

    Ok(())
}

fn valid_delay(secs: f64) -> bool {
    secs.is_finite() && (0.0..=MAX_DELAY_SECS).contains(&secs)
}
