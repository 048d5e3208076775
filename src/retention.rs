//! Daily rotation of the current-state table and retention of history.
//!
//! Run once before harvesting: snapshot `listings` into `listing_history`
//! under today's date, drop listings created before today, and purge
//! history and ledger rows older than the retention window. Re-running on
//! the same day is harmless.

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use sqlx::SqlitePool;
use tracing::info;

use crate::models::CREATED_BY;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RotationStats {
    pub archived: u64,
    pub cleared: u64,
    pub history_purged: u64,
    pub runs_purged: u64,
}

pub async fn rotate(pool: &SqlitePool, today: NaiveDate, history_days: i64) -> Result<RotationStats> {
    let today_start = today
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default();
    let cutoff = Duration::try_days(history_days)
        .and_then(|window| today.checked_sub_signed(window))
        .unwrap_or(NaiveDate::MIN)
        .to_string();
    let today_str = today.to_string();

    let mut tx = pool.begin().await?;

    let archived = sqlx::query(
        r#"
        INSERT OR IGNORE INTO listing_history
            (listing_id, snapshot_date, record_id, query, title, organization, location,
             posted_at, source_link, secondary_link, source, created_by)
        SELECT id, ?, record_id, query, title, organization, location,
               posted_at, source_link, secondary_link, source, ?
        FROM listings
        "#,
    )
    .bind(&today_str)
    .bind(CREATED_BY)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let cleared = sqlx::query("DELETE FROM listings WHERE created_at < ?")
        .bind(today_start)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let history_purged = sqlx::query("DELETE FROM listing_history WHERE snapshot_date < ?")
        .bind(&cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let runs_purged = sqlx::query("DELETE FROM scraper_runs WHERE run_date < ?")
        .bind(&cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    let stats = RotationStats {
        archived,
        cleared,
        history_purged,
        runs_purged,
    };
    info!(
        archived,
        cleared,
        history_purged,
        runs_purged,
        "rotation complete"
    );
    Ok(stats)
}
