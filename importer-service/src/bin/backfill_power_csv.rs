use anyhow::{bail, Result};
use alphaess_client::domain::{DailyTotals, DayBatch};
use importer_service::{
    config::AppConfig,
    observability,
    pipeline::Pipeline,
    reconcile::{ReconcileTransform, ReconciledDay},
    sinks::PostgresDaySink,
    sources::PowerCsvFileSource,
};
use sqlx::postgres::PgPoolOptions;
use std::{env, sync::Arc, time::Duration};
use time::{macros::format_description, Date};

/// Import one day exported as CSV from the vendor app. The app export has no
/// energy totals, so they are passed on the command line (as shown on the
/// app's day screen).
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 7 {
        bail!(
            "usage: backfill_power_csv <csv_path> <device_id> <date> \
             <pv_kwh> <export_kwh> <import_kwh>"
        );
    }

    let date = Date::parse(&args[3], format_description!("[year]-[month]-[day]"))?;
    let totals = DailyTotals {
        pv_kwh: args[4].parse()?,
        feed_in_kwh: args[5].parse()?,
        grid_import_kwh: args[6].parse()?,
    };

    let cfg = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    let sink = PostgresDaySink::new(
        pool,
        cfg.sink.max_retries,
        Duration::from_millis(cfg.sink.retry_backoff_ms),
        cfg.sink.archive_raw,
    );

    let source = PowerCsvFileSource::new(&args[1], &args[2], date, totals);

    let pipeline: Pipeline<_, DayBatch, ReconciledDay, _> = Pipeline {
        source,
        transform: Arc::new(ReconcileTransform),
        sink,
    };

    pipeline.run().await?;

    Ok(())
}
