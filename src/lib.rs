//! # Listing Harvest
//!
//! Incremental harvester for paginated, rate-limited job listings.
//!
//! Each configured query context is fetched page by page, filtered against
//! a recency window and the previous day's results, and committed to a
//! SQLite store under an all-or-nothing transaction. Every attempt is
//! recorded in a run ledger whether or not data survived.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────────┐   ┌─────────────────┐
//! │ PageSource │──▶│  IngestionSession     │──▶│ TransactionalSink│
//! │ (HTTP)     │   │ identity→dedup→recency│   │ export + upsert  │
//! └────────────┘   └──────────────────────┘   └────────┬────────┘
//!                                                        │
//!                         RunLedger begin/end ◀──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`identity`] | Record id and canonical link derivation |
//! | [`recency`] | Posting-date window filter |
//! | [`dedup`] | Cross-run and in-run dedup index |
//! | [`extract`] | Listing extraction from page markup |
//! | [`source`] | Remote page source |
//! | [`fetch`] | Pagination and retry state machine |
//! | [`session`] | Per-query orchestration |
//! | [`sink`] | Transactional commit |
//! | [`ledger`] | Run ledger |
//! | [`export`] | Export artifacts |
//! | [`retention`] | Daily rotation and history retention |
//! | [`ingest`] | Multi-query harvest |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod dedup;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod identity;
pub mod ingest;
pub mod ledger;
pub mod migrate;
pub mod models;
pub mod recency;
pub mod retention;
pub mod session;
pub mod sink;
pub mod source;
