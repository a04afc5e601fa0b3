use anyhow::{bail, Result};
use alphaess_client::domain::DayBatch;
use importer_service::{
    config::AppConfig,
    observability,
    pipeline::Pipeline,
    reconcile::{ReconcileTransform, ReconciledDay},
    sinks::PostgresDaySink,
    sources::ExportFileSource,
};
use sqlx::postgres::PgPoolOptions;
use std::{env, sync::Arc, time::Duration};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: backfill_export_file <ndjson_export_path>");
    }
    let file_path = &args[1];

    // Load configuration (can point IMPORTER_CONFIG to a backfill-specific file).
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

    let source = ExportFileSource::new(file_path);

    let pipeline: Pipeline<_, DayBatch, ReconciledDay, _> = Pipeline {
        source,
        transform: Arc::new(ReconcileTransform),
        sink,
    };

    pipeline.run().await?;

    Ok(())
}
