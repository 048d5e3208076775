//! Record identity derivation.
//!
//! A listing's identifier is the numeric id embedded in its source link.
//! The same id also yields a canonical (mobile-friendly) link.

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::SourceConfig;
use crate::models::RecordId;

#[derive(Debug, Clone)]
pub struct IdentityExtractor {
    pattern: Regex,
    canonical_template: String,
}

impl IdentityExtractor {
    pub fn new(pattern: &str, canonical_template: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .with_context(|| format!("Invalid record id pattern: {}", pattern))?;
        Ok(Self {
            pattern,
            canonical_template: canonical_template.to_string(),
        })
    }

    pub fn from_config(source: &SourceConfig) -> Result<Self> {
        Self::new(&source.id_pattern, &source.canonical_link)
    }

    /// Returns `None` when the link has no embedded id. That marks the
    /// record as unusable; it is never an error.
    pub fn identify(&self, link: &str) -> Option<RecordId> {
        self.pattern
            .captures(link)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|id| !id.is_empty())
            .map(RecordId::new)
    }

    pub fn canonical_link(&self, id: &RecordId) -> String {
        self.canonical_template.replace("{id}", id.as_str())
    }
}
