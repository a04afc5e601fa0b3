use std::time::Duration;

use futures::StreamExt;
use sqlx::{postgres::PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::pipeline::{Envelope, PipelineError, Sink};
use crate::reconcile::ReconciledDay;

/// Persists reconciled days, one transaction per day.
///
/// A day is replaced-or-inserted as a unit: the old rows for
/// `(device_id, date)` are deleted and the 288 fresh rows inserted inside a
/// single transaction, so cancellation or a crash can never leave a
/// half-written day behind. With `archive_raw` the day's parsed raw samples
/// (including the passthrough channels) go into `power_sample` in the same
/// transaction.
///
/// Schema is expected to be applied out-of-band via `sql/schema/*.sql`.
pub struct PostgresDaySink {
    pool: PgPool,
    max_retries: u32,
    retry_backoff: Duration,
    archive_raw: bool,
}

impl PostgresDaySink {
    pub fn new(pool: PgPool, max_retries: u32, retry_backoff: Duration, archive_raw: bool) -> Self {
        Self {
            pool,
            max_retries,
            retry_backoff,
            archive_raw,
        }
    }

    async fn persist_day(&self, day: &ReconciledDay) -> Result<(), sqlx::Error> {
        if day.intervals.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM reconciled_interval WHERE device_id = $1 AND date = $2")
            .bind(&day.device_id)
            .bind(day.date)
            .execute(&mut *tx)
            .await?;

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO reconciled_interval \
             (device_id, date, minute_of_day, pv_kwh, load_kwh, feed_in_kwh, grid_import_kwh) ",
        );
        builder.push_values(&day.intervals, |mut b, row| {
            b.push_bind(&row.device_id)
                .push_bind(row.date)
                .push_bind(row.minute_of_day)
                .push_bind(row.pv_kwh)
                .push_bind(row.load_kwh)
                .push_bind(row.feed_in_kwh)
                .push_bind(row.grid_import_kwh);
        });
        builder.build().execute(&mut *tx).await?;

        if self.archive_raw && !day.samples.is_empty() {
            let day_start = day.date.midnight();
            let day_end = match day.date.next_day() {
                Some(next) => next.midnight(),
                None => PrimitiveDateTime::MAX,
            };

            sqlx::query("DELETE FROM power_sample WHERE device_id = $1 AND ts >= $2 AND ts < $3")
                .bind(&day.device_id)
                .bind(day_start)
                .bind(day_end)
                .execute(&mut *tx)
                .await?;

            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO power_sample \
                 (device_id, ts, pv_w, load_w, feed_in_w, grid_import_w, \
                  battery_capacity, ev_charger_power) ",
            );
            builder.push_values(&day.samples, |mut b, sample| {
                b.push_bind(&sample.device_id)
                    .push_bind(sample.ts)
                    .push_bind(sample.pv_w)
                    .push_bind(sample.load_w)
                    .push_bind(sample.feed_in_w)
                    .push_bind(sample.grid_import_w)
                    .push_bind(sample.battery_capacity)
                    .push_bind(sample.ev_charger_power);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await
    }

    async fn persist_with_retry(&self, day: &ReconciledDay) -> Result<(), PipelineError> {
        let mut attempt: u32 = 0;
        loop {
            match self.persist_day(day).await {
                Ok(()) => {
                    metrics::counter!("persisted_days_total").increment(1);
                    metrics::counter!("reconciled_rows_total")
                        .increment(day.intervals.len() as u64);
                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        device_id = %day.device_id,
                        date = %day.date,
                        error = %e,
                        attempt,
                        "day persist failed, retrying with backoff"
                    );
                    metrics::counter!("day_sink_retry_total").increment(1);
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(
                        device_id = %day.device_id,
                        date = %day.date,
                        error = %e,
                        "day persist failed, giving up"
                    );
                    metrics::counter!("day_sink_errors_total").increment(1);
                    return Err(PipelineError::Sink(e.to_string()));
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Sink<ReconciledDay> for PostgresDaySink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<ReconciledDay>, PipelineError>>
            + Send
            + Unpin
            + 'static,
    {
        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    // One bad day must not end a multi-day run.
                    tracing::error!(error = %e, "skipping failed day in pipeline");
                    metrics::counter!("skipped_days_total").increment(1);
                    continue;
                }
            };

            if self.persist_with_retry(&env.payload).await.is_ok() {
                if let Ok(dur) = std::time::SystemTime::now().duration_since(env.received_at) {
                    metrics::histogram!("import_end_to_end_latency_seconds")
                        .record(dur.as_secs_f64());
                }
            }
        }

        Ok(())
    }
}
