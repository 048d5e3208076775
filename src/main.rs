//! # Listing Harvest CLI (`harvest`)
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest init` | Create the SQLite database and run schema migrations |
//! | `harvest run` | Harvest every configured query context |
//! | `harvest runs` | Show recent run ledger entries |
//! | `harvest export` | Dump the current listings table as JSON |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `listing_harvest=info`).

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use listing_harvest::export::{self, JsonExporter};
use listing_harvest::ingest::{self, HarvestOptions};
use listing_harvest::ledger::RunLedger;
use listing_harvest::source::HttpSource;
use listing_harvest::{config, db, migrate};

/// Incremental, rate-limit aware job listing harvester.
#[derive(Parser)]
#[command(name = "harvest", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Harvest listings for the configured queries.
    ///
    /// Each query is fetched, filtered against the recency window and the
    /// previous day's export, exported, and committed in one transaction.
    /// Ctrl-C stops between pages or between record writes.
    Run {
        /// Only harvest the query with these keywords.
        #[arg(long)]
        query: Option<String>,

        /// Skip archiving and clearing yesterday's listings.
        #[arg(long)]
        no_rotate: bool,
    },

    /// List recent run ledger entries.
    Runs {
        /// Maximum number of runs to show.
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Export current listings as JSON.
    Export {
        /// Output file. Writes to stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("listing_harvest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let pool = db::connect(&cfg).await?;
    migrate::run_migrations(&pool).await?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized successfully.");
        }
        Commands::Run { query, no_rotate } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, stopping after the current step");
                    on_signal.cancel();
                }
            });

            let source = HttpSource::new(&cfg.source)?;
            let exporter = JsonExporter::new(&cfg.export.dir);
            let options = HarvestOptions {
                only_query: query,
                rotate: !no_rotate,
                policy: None,
            };

            let reports =
                ingest::run_harvest(&cfg, &pool, &source, &exporter, &options, Utc::now(), &cancel)
                    .await?;

            for report in &reports {
                println!("run {}", report.query);
                println!("  finalized: {}", report.finalized);
                println!("  committed: {}", report.committed);
                for (kind, count) in &report.skipped {
                    println!("  skipped {}: {}", kind, count);
                }
                if let Some(termination) = &report.termination {
                    println!("  stopped: {:?}", termination);
                }
                if let Some(path) = &report.artifact {
                    println!("  artifact: {}", path.display());
                }
                match &report.error {
                    Some(e) => println!("  rolled back: {}", e),
                    None if report.partial => println!("  status: partial"),
                    None => println!("  status: ok"),
                }
            }
        }
        Commands::Runs { limit } => {
            let ledger = RunLedger::new(pool.clone());
            let runs = ledger.recent(limit).await.context("Failed to read run ledger")?;
            println!(
                "{:<38} {:<24} {:<20} {:>6}",
                "RUN", "QUERY", "STARTED", "TOTAL"
            );
            for run in runs {
                let started = run.started_at.format("%Y-%m-%d %H:%M:%S").to_string();
                let total = match run.ended_at {
                    Some(_) => run.total_count.to_string(),
                    None => "open".to_string(),
                };
                println!(
                    "{:<38} {:<24} {:<20} {:>6}",
                    run.run_id, run.query, started, total
                );
            }
        }
        Commands::Export { output } => {
            export::export_listings(&pool, output.as_deref()).await?;
        }
    }

    pool.close().await;
    Ok(())
}
