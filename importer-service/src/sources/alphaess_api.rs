use std::{
    collections::HashSet,
    pin::Pin,
    time::{Duration, SystemTime},
};

use alphaess_client::domain::{DailyTotals, DayBatch, RawPowerRecord};
use futures::Stream;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha512};
use time::{format_description::BorrowedFormatItem, macros::format_description, Date, OffsetDateTime};
use tokio_util::sync::CancellationToken;

use crate::pipeline::{Envelope, PipelineError, Source};

static DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

/// Upstream open-API error code for "request too frequent".
const THROTTLE_CODE: i32 = 6053;
const SUCCESS_CODE: i32 = 200;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("throttled by upstream")]
    Throttled,
    #[error("api error {code}: {msg}")]
    Api { code: i32, msg: String },
}

/// Request signature required by the vendor open API: hex SHA-512 over
/// app id, secret and the request timestamp.
fn sign(app_id: &str, app_secret: &str, timestamp: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(app_id.as_bytes());
    hasher.update(app_secret.as_bytes());
    hasher.update(timestamp.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[derive(serde::Deserialize)]
struct ApiEnvelope<T> {
    code: i32,
    msg: String,
    data: Option<T>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPowerRecord {
    upload_time: String,
    pv: f64,
    load: f64,
    feed_in: f64,
    grid_import: f64,
    battery_capacity: Option<f64>,
    ev_charger_power: Option<f64>,
}

impl From<ApiPowerRecord> for RawPowerRecord {
    fn from(r: ApiPowerRecord) -> Self {
        RawPowerRecord {
            upload_time: r.upload_time,
            pv: r.pv,
            load: r.load,
            feed_in: r.feed_in,
            grid_import: r.grid_import,
            battery_capacity: r.battery_capacity,
            ev_charger_power: r.ev_charger_power,
        }
    }
}

#[derive(serde::Deserialize)]
struct ApiEnergyRecord {
    epv: f64,
    #[serde(rename = "eOutput")]
    e_output: f64,
    #[serde(rename = "eInput")]
    e_input: f64,
}

/// Thin signed client for the vendor open API.
#[derive(Clone)]
pub struct AlphaEssClient {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    app_secret: String,
}

impl AlphaEssClient {
    pub fn new(base_url: &str, app_id: &str, app_secret: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            app_id: app_id.to_string(),
            app_secret: app_secret.to_string(),
        })
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, ApiError> {
        let timestamp = OffsetDateTime::now_utc().unix_timestamp().to_string();
        let envelope: ApiEnvelope<T> = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("appId", self.app_id.as_str())
            .header("timeStamp", timestamp.as_str())
            .header("sign", sign(&self.app_id, &self.app_secret, &timestamp))
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match envelope.code {
            SUCCESS_CODE => Ok(envelope.data),
            THROTTLE_CODE => Err(ApiError::Throttled),
            code => Err(ApiError::Api {
                code,
                msg: envelope.msg,
            }),
        }
    }

    /// The day's per-minute power telemetry. `None` when the cloud has no
    /// data for the day.
    async fn one_day_power(&self, sn: &str, date: Date) -> Result<Option<Vec<ApiPowerRecord>>, ApiError> {
        let date = date.format(DATE_FORMAT).unwrap_or_default();
        let records: Option<Vec<ApiPowerRecord>> = self
            .get_data(
                "/getOneDayPowerBySn",
                &[("sysSn", sn.to_string()), ("queryDate", date)],
            )
            .await?;
        Ok(records.filter(|r| !r.is_empty()))
    }

    /// The day's authoritative energy totals.
    async fn one_day_energy(&self, sn: &str, date: Date) -> Result<Option<ApiEnergyRecord>, ApiError> {
        let date = date.format(DATE_FORMAT).unwrap_or_default();
        self.get_data(
            "/getOneDateEnergyBySn",
            &[("sysSn", sn.to_string()), ("queryDate", date)],
        )
        .await
    }

    /// Fetch everything the reconciler needs for one day, or `None` when the
    /// cloud holds no telemetry or no totals for it.
    async fn fetch_day(&self, sn: &str, date: Date) -> Result<Option<DayBatch>, ApiError> {
        let Some(records) = self.one_day_power(sn, date).await? else {
            return Ok(None);
        };
        let Some(energy) = self.one_day_energy(sn, date).await? else {
            return Ok(None);
        };

        Ok(Some(DayBatch {
            device_id: sn.to_string(),
            date,
            records: records.into_iter().map(RawPowerRecord::from).collect(),
            totals: DailyTotals {
                pv_kwh: energy.epv,
                feed_in_kwh: energy.e_output,
                grid_import_kwh: energy.e_input,
            },
        }))
    }
}

/// Live source: walks an inclusive date range one day at a time, yielding a
/// [`DayBatch`] per day with telemetry.
///
/// Already-reconciled days are skipped without a fetch. Between days the
/// source sleeps to respect the upstream rate limit and honours cooperative
/// cancellation; a day that has started is always finished and the break
/// happens only on the boundary. A day that fails after retries is logged
/// and skipped; it never ends the run.
#[derive(Clone)]
pub struct AlphaEssApiSource {
    client: AlphaEssClient,
    device_id: String,
    start: Date,
    end: Date,
    skip: HashSet<Date>,
    pause_between_days: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    cancel: CancellationToken,
}

impl AlphaEssApiSource {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: AlphaEssClient,
        device_id: &str,
        start: Date,
        end: Date,
        skip: HashSet<Date>,
        pause_between_days: Duration,
        max_retries: u32,
        retry_backoff: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            device_id: device_id.to_string(),
            start,
            end,
            skip,
            pause_between_days,
            max_retries,
            retry_backoff,
            cancel,
        }
    }

    /// One day's fetch with linear-backoff retries on upstream throttling.
    async fn fetch_day_with_retry(&self, date: Date) -> Result<Option<DayBatch>, ApiError> {
        let mut attempt: u32 = 0;
        loop {
            match self.client.fetch_day(&self.device_id, date).await {
                Err(ApiError::Throttled) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        device_id = %self.device_id,
                        %date,
                        attempt,
                        "throttled by upstream, backing off"
                    );
                    metrics::counter!("alphaess_api_throttled_total").increment(1);
                    tokio::time::sleep(sleep_for).await;
                }
                other => return other,
            }
        }
    }
}

#[async_trait::async_trait]
impl Source<DayBatch> for AlphaEssApiSource {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<DayBatch>, PipelineError>> + Send>> {
        let source = self.clone();

        let s = async_stream::stream! {
            let mut date = Some(source.start);
            while let Some(day) = date {
                if day > source.end {
                    break;
                }
                if source.cancel.is_cancelled() {
                    tracing::info!(%day, "cancellation requested, stopping before next day");
                    break;
                }
                date = day.next_day();

                if source.skip.contains(&day) {
                    tracing::debug!(%day, "already reconciled, skipping");
                    continue;
                }

                match source.fetch_day_with_retry(day).await {
                    Ok(Some(batch)) => {
                        metrics::counter!("alphaess_api_days_fetched_total").increment(1);
                        yield Ok::<_, PipelineError>(Envelope {
                            payload: batch,
                            received_at: SystemTime::now(),
                        });
                    }
                    Ok(None) => {
                        tracing::warn!(
                            device_id = %source.device_id,
                            %day,
                            "no telemetry or totals upstream, skipping day"
                        );
                        metrics::counter!("alphaess_api_empty_days_total").increment(1);
                    }
                    Err(e) => {
                        tracing::error!(
                            device_id = %source.device_id,
                            %day,
                            error = %e,
                            "fetch failed, skipping day"
                        );
                        metrics::counter!("alphaess_api_failed_days_total").increment(1);
                    }
                }

                if date.map_or(false, |d| d <= source.end) {
                    tokio::time::sleep(source.pause_between_days).await;
                }
            }
        };

        Box::pin(s)
    }
}
