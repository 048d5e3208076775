use anyhow::Result;
use sqlx::SqlitePool;

/// Create the ledger, listing, and history tables. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Run ledger: one row per attempted query context
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scraper_runs (
            run_id TEXT PRIMARY KEY,
            query TEXT NOT NULL,
            source TEXT NOT NULL,
            run_date TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            ended_at INTEGER,
            total_count INTEGER NOT NULL DEFAULT 0,
            created_by TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Current-state listings
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS listings (
            id TEXT PRIMARY KEY,
            record_id TEXT NOT NULL,
            query TEXT NOT NULL,
            title TEXT NOT NULL,
            organization TEXT NOT NULL,
            location TEXT NOT NULL,
            posted_at TEXT NOT NULL,
            source_link TEXT NOT NULL,
            secondary_link TEXT NOT NULL,
            source TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            created_by TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(source, query, record_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Daily snapshots of listings
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS listing_history (
            listing_id TEXT NOT NULL,
            snapshot_date TEXT NOT NULL,
            record_id TEXT NOT NULL,
            query TEXT NOT NULL,
            title TEXT NOT NULL,
            organization TEXT NOT NULL,
            location TEXT NOT NULL,
            posted_at TEXT NOT NULL,
            source_link TEXT NOT NULL,
            secondary_link TEXT NOT NULL,
            source TEXT NOT NULL,
            created_by TEXT NOT NULL,
            PRIMARY KEY (listing_id, snapshot_date)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_scraper_runs_started_at ON scraper_runs(started_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_listings_created_at ON listings(created_at)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_listing_history_snapshot ON listing_history(snapshot_date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
