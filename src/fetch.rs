//! Pagination and retry state machine.
//!
//! The fetch loop distinguishes three kinds of trouble:
//!
//! | Response | Page index | Failure counter | Next step |
//! |----------|------------|-----------------|-----------|
//! | 429 | unchanged | unchanged | random backoff, same page |
//! | end-of-results status (default 400) | unchanged | unchanged | terminal |
//! | other non-2xx, timeout, transport | unchanged | +1 | fixed delay, same page; terminal past the budget |
//! | 2xx, no listings | unchanged | unchanged | terminal |
//! | 2xx, listings | +1 | reset | emit, then polite delay |
//!
//! Every wait is a cancellable sleep, and cancellation is checked before
//! each page attempt.

use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::FetchConfig;
use crate::extract::ListingExtractor;
use crate::models::{QueryContext, RawRecord, SkipReason};
use crate::source::PageSource;

#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub retry_budget: u32,
    pub rate_limit_backoff: (Duration, Duration),
    pub polite_delay: (Duration, Duration),
    pub failure_delay: Duration,
    pub end_of_results_statuses: Vec<u16>,
}

impl FetchPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            retry_budget: config.retry_budget,
            rate_limit_backoff: config.rate_limit_backoff(),
            polite_delay: config.polite_delay(),
            failure_delay: config.failure_delay(),
            end_of_results_statuses: config.end_of_results_statuses.clone(),
        }
    }

    /// No waits at all; used by tests and dry runs against local sources.
    pub fn immediate(retry_budget: u32) -> Self {
        Self {
            retry_budget,
            rate_limit_backoff: (Duration::ZERO, Duration::ZERO),
            polite_delay: (Duration::ZERO, Duration::ZERO),
            failure_delay: Duration::ZERO,
            end_of_results_statuses: vec![400],
        }
    }
}

/// Why the fetch loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// A successful page carried no listings.
    Exhausted,
    /// The source answered with a status configured as end-of-results.
    EndOfResults { status: u16 },
    /// Too many consecutive failures on one page.
    RetryBudgetExhausted { failures: u32, last_error: String },
    Cancelled,
}

impl Termination {
    /// Whether the results gathered so far may be missing pages.
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            Termination::RetryBudgetExhausted { .. } | Termination::Cancelled
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchState {
    pub page: u32,
    pub failures: u32,
    pub terminal: Option<Termination>,
    pub rate_limited: u32,
}

impl FetchState {
    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }
}

/// One successfully fetched page.
#[derive(Debug)]
pub struct Page {
    pub index: u32,
    pub listings: Vec<Result<RawRecord, SkipReason>>,
}

pub struct Paginator<'a> {
    source: &'a dyn PageSource,
    extractor: &'a ListingExtractor,
    query: &'a QueryContext,
    policy: &'a FetchPolicy,
    state: FetchState,
    throttle_next: bool,
}

impl<'a> Paginator<'a> {
    pub fn new(
        source: &'a dyn PageSource,
        extractor: &'a ListingExtractor,
        query: &'a QueryContext,
        policy: &'a FetchPolicy,
    ) -> Self {
        Self {
            source,
            extractor,
            query,
            policy,
            state: FetchState::default(),
            throttle_next: false,
        }
    }

    pub fn state(&self) -> &FetchState {
        &self.state
    }

    pub fn into_state(self) -> FetchState {
        self.state
    }

    /// Fetch the next non-empty page, or `None` once the loop is terminal.
    pub async fn next_page(&mut self, cancel: &CancellationToken) -> Option<Page> {
        if self.state.is_terminal() {
            return None;
        }

        if self.throttle_next {
            self.throttle_next = false;
            let delay = jitter(self.policy.polite_delay);
            debug!(query = %self.query, delay_ms = delay.as_millis() as u64, "polite delay");
            if !pause(delay, cancel).await {
                return self.terminate(Termination::Cancelled);
            }
        }

        loop {
            if cancel.is_cancelled() {
                return self.terminate(Termination::Cancelled);
            }

            let page = self.state.page;
            debug!(query = %self.query, page, "fetching page");

            let error = match self.source.fetch_page(self.query, page).await {
                Ok(resp) if resp.status == 429 => {
                    self.state.rate_limited += 1;
                    let wait = jitter(self.policy.rate_limit_backoff);
                    warn!(
                        query = %self.query,
                        page,
                        wait_secs = wait.as_secs_f64(),
                        "rate limited, backing off"
                    );
                    if !pause(wait, cancel).await {
                        return self.terminate(Termination::Cancelled);
                    }
                    continue;
                }
                Ok(resp) if (200..300).contains(&resp.status) => {
                    let listings = self.extractor.extract(&resp.body);
                    if listings.is_empty() {
                        info!(query = %self.query, page, "no more listings");
                        return self.terminate(Termination::Exhausted);
                    }
                    self.state.failures = 0;
                    self.state.page += 1;
                    self.throttle_next = true;
                    debug!(query = %self.query, page, listings = listings.len(), "page fetched");
                    return Some(Page {
                        index: page,
                        listings,
                    });
                }
                Ok(resp) if self.policy.end_of_results_statuses.contains(&resp.status) => {
                    info!(query = %self.query, page, status = resp.status, "end of results");
                    return self.terminate(Termination::EndOfResults {
                        status: resp.status,
                    });
                }
                Ok(resp) => format!("HTTP {}", resp.status),
                Err(failure) => failure.to_string(),
            };

            self.state.failures += 1;
            warn!(
                query = %self.query,
                page,
                failures = self.state.failures,
                error = %error,
                "page fetch failed"
            );
            if self.state.failures > self.policy.retry_budget {
                warn!(query = %self.query, page, "retry budget exhausted, stopping");
                return self.terminate(Termination::RetryBudgetExhausted {
                    failures: self.state.failures,
                    last_error: error,
                });
            }
            if !pause(self.policy.failure_delay, cancel).await {
                return self.terminate(Termination::Cancelled);
            }
        }
    }

    fn terminate(&mut self, reason: Termination) -> Option<Page> {
        self.state.terminal = Some(reason);
        None
    }
}

/// Uniformly random duration within `[min, max]`.
fn jitter((min, max): (Duration, Duration)) -> Duration {
    if max <= min {
        return min;
    }
    let secs = rand::rng().random_range(min.as_secs_f64()..=max.as_secs_f64());
    Duration::from_secs_f64(secs)
}

/// Sleep for `duration` unless cancelled first. Returns `false` on cancel.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
