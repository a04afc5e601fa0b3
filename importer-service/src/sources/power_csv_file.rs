use std::{fs::File, path::PathBuf, pin::Pin, time::SystemTime};

use alphaess_client::domain::{DailyTotals, DayBatch, RawPowerRecord};
use csv::StringRecord;
use futures::Stream;
use time::Date;

use crate::pipeline::{Envelope, PipelineError, Source};

/// CSV import of one day of per-minute power rows, as exported by the vendor
/// app.
///
/// Expected header columns (by name):
/// - upload_time ("YYYY-MM-DD HH:mm:ss", local)
/// - pv (W)
/// - load (W)
/// - feed_in (W)
/// - grid_import (W)
/// - battery_capacity (optional)
/// - ev_charger_power (optional)
///
/// The app export carries no energy totals, so the caller supplies them; the
/// file and the totals together form a single [`DayBatch`].
pub struct PowerCsvFileSource {
    path: PathBuf,
    device_id: String,
    date: Date,
    totals: DailyTotals,
}

impl PowerCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P, device_id: &str, date: Date, totals: DailyTotals) -> Self {
        Self {
            path: path.into(),
            device_id: device_id.to_string(),
            date,
            totals,
        }
    }
}

fn parse_optional_f64(s: &str) -> Option<f64> {
    if s.trim().is_empty() {
        None
    } else {
        s.trim().parse().ok()
    }
}

fn record_to_raw(record: &StringRecord, headers: &StringRecord) -> Result<RawPowerRecord, PipelineError> {
    let get = |name: &str| -> Result<&str, PipelineError> {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|idx| record.get(idx))
            .ok_or_else(|| PipelineError::Source(format!("missing column '{name}' in CSV record")))
    };

    let required = |name: &str| -> Result<f64, PipelineError> {
        let raw = get(name)?;
        raw.trim()
            .parse()
            .map_err(|e| PipelineError::Source(format!("invalid {name} '{raw}': {e}")))
    };

    Ok(RawPowerRecord {
        upload_time: get("upload_time")?.trim().to_string(),
        pv: required("pv")?,
        load: required("load")?,
        feed_in: required("feed_in")?,
        grid_import: required("grid_import")?,
        battery_capacity: get("battery_capacity").ok().and_then(parse_optional_f64),
        ev_charger_power: get("ev_charger_power").ok().and_then(parse_optional_f64),
    })
}

#[async_trait::async_trait]
impl Source<DayBatch> for PowerCsvFileSource {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<DayBatch>, PipelineError>> + Send>> {
        // Blocking CSV reader wrapped in a single async task; day exports are
        // small (1440 rows), so this stays off a dedicated thread pool.
        let path = self.path.clone();
        let device_id = self.device_id.clone();
        let date = self.date;
        let totals = self.totals;

        let s = async_stream::try_stream! {
            let file = File::open(&path)
                .map_err(|e| PipelineError::Source(format!("failed to open CSV file: {e}")))?;
            let mut rdr = csv::Reader::from_reader(file);
            let headers = rdr
                .headers()
                .map_err(|e| PipelineError::Source(format!("failed to read CSV headers: {e}")))?
                .clone();

            let mut records = Vec::new();
            for result in rdr.records() {
                let record = result.map_err(|e| PipelineError::Source(format!(
                    "failed to read CSV record: {e}"
                )))?;

                match record_to_raw(&record, &headers) {
                    Ok(raw) => records.push(raw),
                    Err(e) => {
                        metrics::counter!("power_csv_parse_errors_total").increment(1);
                        Err(e)?;
                    }
                }
            }

            yield Envelope {
                payload: DayBatch {
                    device_id,
                    date,
                    records,
                    totals,
                },
                received_at: SystemTime::now(),
            };
        };

        Box::pin(s)
    }
}
