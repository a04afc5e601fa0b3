use std::{path::PathBuf, pin::Pin, time::SystemTime};

use alphaess_client::domain::{DailyTotals, DayBatch, RawPowerRecord};
use async_stream::try_stream;
use futures::Stream;
use time::{format_description::BorrowedFormatItem, macros::format_description, Date};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use crate::pipeline::{Envelope, PipelineError, Source};

static DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

/// NDJSON batch import: every line of the file is one complete exported day
/// (`deviceId`, `date`, `records`, `totals`).
///
/// The payload is normalized to the same [`DayBatch`] the live source
/// produces, so an imported day reconciles bit-identically to a fetched one.
pub struct ExportFileSource {
    path: PathBuf,
}

impl ExportFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportDay {
    device_id: String,
    date: String,
    records: Vec<ExportRecord>,
    totals: ExportTotals,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportRecord {
    upload_time: String,
    pv: f64,
    load: f64,
    feed_in: f64,
    grid_import: f64,
    #[serde(default)]
    battery_capacity: Option<f64>,
    #[serde(default)]
    ev_charger_power: Option<f64>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportTotals {
    pv_energy: f64,
    export_energy: f64,
    import_energy: f64,
}

impl TryFrom<ExportDay> for DayBatch {
    type Error = PipelineError;

    fn try_from(day: ExportDay) -> Result<Self, PipelineError> {
        let date = Date::parse(day.date.trim(), DATE_FORMAT).map_err(|e| {
            PipelineError::Source(format!("invalid export date '{}': {e}", day.date))
        })?;

        Ok(DayBatch {
            device_id: day.device_id,
            date,
            records: day
                .records
                .into_iter()
                .map(|r| RawPowerRecord {
                    upload_time: r.upload_time,
                    pv: r.pv,
                    load: r.load,
                    feed_in: r.feed_in,
                    grid_import: r.grid_import,
                    battery_capacity: r.battery_capacity,
                    ev_charger_power: r.ev_charger_power,
                })
                .collect(),
            totals: DailyTotals {
                pv_kwh: day.totals.pv_energy,
                feed_in_kwh: day.totals.export_energy,
                grid_import_kwh: day.totals.import_energy,
            },
        })
    }
}

#[async_trait::async_trait]
impl Source<DayBatch> for ExportFileSource {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<DayBatch>, PipelineError>> + Send>> {
        let path = self.path.clone();
        let s = try_stream! {
            let file = File::open(&path).await.map_err(|e| {
                PipelineError::Source(format!("failed to open export file: {e}"))
            })?;
            let reader = BufReader::new(file);
            let mut lines = reader.lines();

            while let Some(line) = lines.next_line().await.map_err(|e| {
                PipelineError::Source(format!("failed to read export line: {e}"))
            })? {
                if line.trim().is_empty() {
                    continue;
                }

                let parsed: ExportDay = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        metrics::counter!("export_file_parse_errors_total").increment(1);
                        Err(PipelineError::Source(format!(
                            "failed to parse export json line: {e}"
                        )))?
                    }
                };
                let batch = DayBatch::try_from(parsed)?;

                yield Envelope {
                    payload: batch,
                    received_at: SystemTime::now(),
                };
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn export_line_normalizes_to_a_day_batch() {
        let line = r#"{
            "deviceId": "AL1000",
            "date": "2024-06-01",
            "records": [
                {"uploadTime": "2024-06-01 00:00:00", "pv": 0.0, "load": 250.0,
                 "feedIn": 0.0, "gridImport": 250.0, "batteryCapacity": 40.0},
                {"uploadTime": "2024-06-01 12:00:00", "pv": 3100.0, "load": 400.0,
                 "feedIn": 2700.0, "gridImport": 0.0}
            ],
            "totals": {"pvEnergy": 17.2, "exportEnergy": 9.1, "importEnergy": 3.0}
        }"#;

        let parsed: ExportDay = serde_json::from_str(line).unwrap();
        let batch = DayBatch::try_from(parsed).unwrap();

        assert_eq!(batch.device_id, "AL1000");
        assert_eq!(batch.date, date!(2024 - 06 - 01));
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].battery_capacity, Some(40.0));
        assert_eq!(batch.records[1].ev_charger_power, None);
        assert_eq!(batch.totals.pv_kwh, 17.2);
        assert_eq!(batch.totals.feed_in_kwh, 9.1);
        assert_eq!(batch.totals.grid_import_kwh, 3.0);
        assert_eq!(batch.totals.load_kwh(), 17.2 - 9.1 + 3.0);
    }

    #[test]
    fn a_bad_date_is_a_source_error() {
        let line = r#"{"deviceId": "AL1000", "date": "junk", "records": [],
                       "totals": {"pvEnergy": 0.0, "exportEnergy": 0.0, "importEnergy": 0.0}}"#;
        let parsed: ExportDay = serde_json::from_str(line).unwrap();
        assert!(DayBatch::try_from(parsed).is_err());
    }
}
