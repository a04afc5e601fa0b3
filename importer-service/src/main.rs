use anyhow::Result;
use alphaess_client::{db::reconciled_queries, domain::DayBatch};
use importer_service::{
    config::AppConfig,
    metrics_server, observability,
    pipeline::Pipeline,
    reconcile::{ReconcileTransform, ReconciledDay},
    sinks::PostgresDaySink,
    sources::{AlphaEssApiSource, AlphaEssClient},
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr);
    }

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    let (start, end) = cfg.api.date_range()?;

    // Days that already reconciled are skipped without a fetch, so rerunning
    // the same window only does the missing work.
    let skip = reconciled_queries::reconciled_dates(&pool, &cfg.api.device_id).await?;
    tracing::info!(
        device_id = %cfg.api.device_id,
        %start,
        %end,
        already_done = skip.len(),
        "starting import run"
    );

    // Ctrl-c stops between days; a day that started persisting always
    // finishes (the sink writes each day in one transaction).
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("ctrl-c received, stopping after the current day");
                cancel.cancel();
            }
        });
    }

    let client = AlphaEssClient::new(&cfg.api.base_url, &cfg.api.app_id, &cfg.api.app_secret)?;
    let source = AlphaEssApiSource::new(
        client,
        &cfg.api.device_id,
        start,
        end,
        skip,
        Duration::from_millis(cfg.api.pause_between_days_ms),
        cfg.api.throttle_max_retries,
        Duration::from_millis(cfg.api.throttle_backoff_ms),
        cancel,
    );

    let sink = PostgresDaySink::new(
        pool,
        cfg.sink.max_retries,
        Duration::from_millis(cfg.sink.retry_backoff_ms),
        cfg.sink.archive_raw,
    );

    let pipeline: Pipeline<_, DayBatch, ReconciledDay, _> = Pipeline {
        source,
        transform: Arc::new(ReconcileTransform),
        sink,
    };
    pipeline.run().await?;

    tracing::info!("import run complete");
    Ok(())
}
