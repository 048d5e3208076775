//! Remote listing source.
//!
//! [`PageSource`] is the seam between the fetch loop and the network.
//! [`HttpSource`] talks to the guest search endpoint with `reqwest`;
//! tests substitute scripted sources.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::SourceConfig;
use crate::models::QueryContext;

/// A page request that produced an HTTP response, successful or not.
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
}

/// A page request that produced no HTTP response at all.
#[derive(Debug, Clone, Error)]
pub enum FetchFailure {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait PageSource: Send + Sync {
    /// Source label recorded in the ledger and the listings table.
    fn name(&self) -> &str;

    /// Request page `page` (zero-based) of results for `query`.
    async fn fetch_page(
        &self,
        query: &QueryContext,
        page: u32,
    ) -> std::result::Result<PageResponse, FetchFailure>;
}

pub struct HttpSource {
    client: reqwest::Client,
    config: SourceConfig,
}

impl HttpSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn params(&self, query: &QueryContext, page: u32) -> Vec<(&'static str, String)> {
        vec![
            ("keywords", query.keywords.clone()),
            ("location", query.location.clone()),
            ("sortBy", self.config.sort_by.clone()),
            ("f_TPR", self.config.time_filter.clone()),
            ("start", (page * self.config.page_size).to_string()),
        ]
    }
}

#[async_trait]
impl PageSource for HttpSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn fetch_page(
        &self,
        query: &QueryContext,
        page: u32,
    ) -> std::result::Result<PageResponse, FetchFailure> {
        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&self.params(query, page))
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;
        Ok(PageResponse { status, body })
    }
}

fn classify(err: reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        FetchFailure::Timeout
    } else {
        FetchFailure::Transport(err.to_string())
    }
}
