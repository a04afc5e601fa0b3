use std::collections::HashSet;

use anyhow::Result;
use sqlx::PgPool;
use time::Date;

use crate::domain::ReconciledInterval;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DayChannelSums {
    pub date: Date,
    pub pv_kwh: f64,
    pub load_kwh: f64,
    pub feed_in_kwh: f64,
    pub grid_import_kwh: f64,
}

/// Dates for which a device already has a reconciled series.
///
/// The importer consults this before fetching, so a day that already
/// succeeded is skipped rather than recomputed.
pub async fn reconciled_dates(pool: &PgPool, device_id: &str) -> Result<HashSet<Date>> {
    let rows: Vec<(Date,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT date
        FROM reconciled_interval
        WHERE device_id = $1
        "#,
    )
    .bind(device_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(d,)| d).collect())
}

/// Fetch the slot-ordered reconciled profile for a single device/day.
pub async fn day_profile(
    pool: &PgPool,
    device_id: &str,
    date: Date,
) -> Result<Vec<ReconciledInterval>> {
    let rows = sqlx::query_as::<_, ReconciledInterval>(
        r#"
        SELECT
            device_id,
            date,
            minute_of_day,
            pv_kwh,
            load_kwh,
            feed_in_kwh,
            grid_import_kwh
        FROM reconciled_interval
        WHERE device_id = $1
          AND date = $2
        ORDER BY minute_of_day
        "#,
    )
    .bind(device_id)
    .bind(date)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Per-day channel sums over a date range, for balance reporting.
pub async fn daily_sums(
    pool: &PgPool,
    device_id: &str,
    start: Date,
    end: Date,
) -> Result<Vec<DayChannelSums>> {
    let rows = sqlx::query_as::<_, DayChannelSums>(
        r#"
        SELECT
            date,
            SUM(pv_kwh)          AS pv_kwh,
            SUM(load_kwh)        AS load_kwh,
            SUM(feed_in_kwh)     AS feed_in_kwh,
            SUM(grid_import_kwh) AS grid_import_kwh
        FROM reconciled_interval
        WHERE device_id = $1
          AND date >= $2
          AND date <= $3
        GROUP BY date
        ORDER BY date
        "#,
    )
    .bind(device_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
