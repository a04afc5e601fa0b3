pub mod dst;
pub mod ingest;
pub mod interpolate;
pub mod resample;
pub mod series;
pub mod unitize;

use std::fmt;

use alphaess_client::domain::{Channel, DayBatch, PowerSample, ReconciledInterval};
use time::Date;

use crate::pipeline::{Envelope, PipelineError, Transform};
pub use dst::DayShape;

/// Non-fatal findings about a day's input data, carried on the result so the
/// caller can log and count them.
#[derive(Debug, Clone, PartialEq)]
pub enum QualityWarning {
    /// Records dropped during ingestion (bad timestamp or foreign date).
    DroppedSamples { count: usize },
    /// A channel with no telemetry signal all day; emitted as zeros even if
    /// the authoritative total says otherwise.
    ZeroSignal { channel: Channel },
}

impl fmt::Display for QualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityWarning::DroppedSamples { count } => {
                write!(f, "dropped {count} unusable raw samples")
            }
            QualityWarning::ZeroSignal { channel } => {
                write!(f, "no {} signal all day, channel zeroed", channel.as_str())
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("no usable telemetry for {device_id} on {date}")]
    EmptyDay { device_id: String, date: Date },
    #[error(
        "irregular bucket count {count} for {device_id} on {date} \
         (expected 288, or 289 on a fall-back day)"
    )]
    BucketCountAnomaly {
        device_id: String,
        date: Date,
        count: usize,
    },
}

/// A fully reconciled `(device, day)`: 288 interval rows whose per-channel
/// sums match the authoritative daily totals, plus the parsed raw samples
/// for optional archiving.
#[derive(Debug)]
pub struct ReconciledDay {
    pub device_id: String,
    pub date: Date,
    pub shape: DayShape,
    pub intervals: Vec<ReconciledInterval>,
    pub samples: Vec<PowerSample>,
    pub warnings: Vec<QualityWarning>,
}

/// Run the whole reconciliation pipeline for one device/day.
///
/// Pure: the same batch always produces the same output, so a retried day is
/// idempotent by construction. Stage order is ingest, resample, pad,
/// interpolate, DST-collapse, unitize.
pub fn reconcile_day(batch: &DayBatch) -> Result<ReconciledDay, ReconcileError> {
    let outcome = ingest::ingest(batch.date, &batch.records);
    if outcome.samples.is_empty() {
        return Err(ReconcileError::EmptyDay {
            device_id: batch.device_id.clone(),
            date: batch.date,
        });
    }

    let mut warnings = Vec::new();
    if outcome.dropped > 0 {
        warnings.push(QualityWarning::DroppedSamples {
            count: outcome.dropped,
        });
    }

    let mut day = resample::resample(&outcome.samples);
    resample::pad_boundaries(&mut day);
    interpolate::fill_gaps(&mut day);

    let shape = dst::reconcile_dst(&mut day).map_err(|dst::IrregularCount(count)| {
        ReconcileError::BucketCountAnomaly {
            device_id: batch.device_id.clone(),
            date: batch.date,
            count,
        }
    })?;

    let unitized = unitize::unitize(&day, &batch.totals);
    warnings.extend(
        unitized
            .zero_channels
            .into_iter()
            .map(|channel| QualityWarning::ZeroSignal { channel }),
    );

    let intervals = unitized
        .energies
        .into_iter()
        .map(|(key, quad)| ReconciledInterval {
            device_id: batch.device_id.clone(),
            date: batch.date,
            minute_of_day: i32::from(key.minute),
            pv_kwh: quad.pv,
            load_kwh: quad.load,
            feed_in_kwh: quad.feed_in,
            grid_import_kwh: quad.grid_import,
        })
        .collect();

    let samples = outcome
        .samples
        .into_iter()
        .map(|s| PowerSample {
            device_id: batch.device_id.clone(),
            ts: s.ts,
            pv_w: s.power.pv,
            load_w: s.power.load,
            feed_in_w: s.power.feed_in,
            grid_import_w: s.power.grid_import,
            battery_capacity: s.battery_capacity,
            ev_charger_power: s.ev_charger_power,
        })
        .collect();

    Ok(ReconciledDay {
        device_id: batch.device_id.clone(),
        date: batch.date,
        shape,
        intervals,
        samples,
        warnings,
    })
}

/// Pipeline stage wrapping the pure core with logging and metrics.
#[derive(Clone, Default)]
pub struct ReconcileTransform;

#[async_trait::async_trait]
impl Transform<DayBatch, ReconciledDay> for ReconcileTransform {
    async fn apply(
        &self,
        input: Envelope<DayBatch>,
    ) -> Result<Envelope<ReconciledDay>, PipelineError> {
        let received_at = input.received_at;
        match reconcile_day(&input.payload) {
            Ok(day) => {
                for warning in &day.warnings {
                    tracing::warn!(
                        device_id = %day.device_id,
                        date = %day.date,
                        %warning,
                        "data quality warning"
                    );
                    match warning {
                        QualityWarning::DroppedSamples { count } => {
                            metrics::counter!("reconcile_dropped_samples_total")
                                .increment(*count as u64);
                        }
                        QualityWarning::ZeroSignal { .. } => {
                            metrics::counter!("reconcile_zero_signal_channels_total").increment(1);
                        }
                    }
                }
                if day.shape == DayShape::DstFallback {
                    tracing::info!(
                        device_id = %day.device_id,
                        date = %day.date,
                        "collapsed DST fall-back duplicate"
                    );
                    metrics::counter!("reconcile_dst_fallback_days_total").increment(1);
                }
                metrics::counter!("reconcile_days_total").increment(1);

                Ok(Envelope {
                    payload: day,
                    received_at,
                })
            }
            Err(e) => {
                metrics::counter!("reconcile_failed_days_total").increment(1);
                Err(PipelineError::Transform(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alphaess_client::domain::{DailyTotals, RawPowerRecord};
    use super::series::{LAST_SLOT_MINUTE, SLOT_MINUTES, SLOTS_PER_DAY};
    use time::macros::date;

    fn record(upload_time: String, pv: f64, load: f64, feed: f64, buy: f64) -> RawPowerRecord {
        RawPowerRecord {
            upload_time,
            pv,
            load,
            feed_in: feed,
            grid_import: buy,
            battery_capacity: Some(55.0),
            ev_charger_power: None,
        }
    }

    /// One record per 5-minute window across the whole day.
    fn full_day_records() -> Vec<RawPowerRecord> {
        let mut records = Vec::new();
        let mut minute: u16 = 0;
        while minute <= LAST_SLOT_MINUTE {
            let ts = format!("2024-06-01 {:02}:{:02}:00", minute / 60, minute % 60);
            let m = f64::from(minute);
            records.push(record(ts, m + 10.0, m % 400.0 + 50.0, m % 150.0, m % 70.0 + 5.0));
            minute += SLOT_MINUTES;
        }
        records
    }

    fn batch(records: Vec<RawPowerRecord>) -> DayBatch {
        DayBatch {
            device_id: "AL1000".to_string(),
            date: date!(2024 - 06 - 01),
            records,
            totals: DailyTotals {
                pv_kwh: 18.5,
                feed_in_kwh: 4.25,
                grid_import_kwh: 3.75,
            },
        }
    }

    #[test]
    fn full_day_covers_every_slot_exactly_once() {
        let day = reconcile_day(&batch(full_day_records())).unwrap();

        assert_eq!(day.shape, DayShape::Normal);
        assert_eq!(day.intervals.len(), SLOTS_PER_DAY);
        for (i, interval) in day.intervals.iter().enumerate() {
            assert_eq!(interval.minute_of_day, i as i32 * 5);
        }
    }

    #[test]
    fn sparse_day_still_covers_every_slot() {
        // Telemetry from 07:30 to 18:00 only, every 25 minutes.
        let mut records = Vec::new();
        let mut minute: u16 = 450;
        while minute <= 1080 {
            let ts = format!("2024-06-01 {:02}:{:02}:00", minute / 60, minute % 60);
            records.push(record(ts, 800.0, 300.0, 200.0, 20.0));
            minute += 25;
        }
        let day = reconcile_day(&batch(records)).unwrap();

        assert_eq!(day.intervals.len(), SLOTS_PER_DAY);
        assert_eq!(day.intervals.first().unwrap().minute_of_day, 0);
        assert_eq!(day.intervals.last().unwrap().minute_of_day, 1435);
    }

    #[test]
    fn channel_sums_match_the_authoritative_totals() {
        let b = batch(full_day_records());
        let day = reconcile_day(&b).unwrap();

        let sums = day.intervals.iter().fold([0.0f64; 4], |mut acc, i| {
            acc[0] += i.pv_kwh;
            acc[1] += i.load_kwh;
            acc[2] += i.feed_in_kwh;
            acc[3] += i.grid_import_kwh;
            acc
        });
        let expected = [
            b.totals.pv_kwh,
            b.totals.load_kwh(),
            b.totals.feed_in_kwh,
            b.totals.grid_import_kwh,
        ];
        for (sum, want) in sums.iter().zip(expected) {
            assert!((sum - want).abs() <= want.abs() * 1e-9, "{sum} != {want}");
        }
    }

    #[test]
    fn charge_identity_holds_for_every_interval() {
        let day = reconcile_day(&batch(full_day_records())).unwrap();
        for interval in &day.intervals {
            let implied = (interval.pv_kwh + interval.grid_import_kwh)
                - (interval.load_kwh + interval.feed_in_kwh);
            assert_eq!(interval.charge_kwh(), implied);
        }
    }

    #[test]
    fn rerunning_a_day_reproduces_identical_output() {
        let b = batch(full_day_records());
        let first = reconcile_day(&b).unwrap();
        let second = reconcile_day(&b).unwrap();

        assert_eq!(first.intervals, second.intervals);
        assert_eq!(first.samples, second.samples);
        assert_eq!(first.warnings, second.warnings);
    }

    #[test]
    fn fall_back_day_collapses_to_288_slots_conserving_energy() {
        // A replayed 02:00 reading lands between 02:55 and 03:00 in upstream
        // order; exactly one folded bucket survives, giving the 289 count.
        let mut records = full_day_records();
        let replay_at = records
            .iter()
            .position(|r| r.upload_time.contains("02:55"))
            .unwrap()
            + 1;
        records.insert(
            replay_at,
            record("2024-06-01 02:00:00".to_string(), 1000.0, 0.0, 0.0, 0.0),
        );

        let day = reconcile_day(&batch(records)).unwrap();

        assert_eq!(day.shape, DayShape::DstFallback);
        assert_eq!(day.intervals.len(), SLOTS_PER_DAY);

        // The duplicated slot keeps the summed energy of both passes: its
        // scaled pv must sit in the same ratio to its neighbour as the summed
        // watts (130 + 1000) do to that neighbour's 135.
        let at = |minute: i32| {
            day.intervals
                .iter()
                .find(|i| i.minute_of_day == minute)
                .unwrap()
        };
        let ratio = at(120).pv_kwh / at(125).pv_kwh;
        assert!((ratio - 1130.0 / 135.0).abs() < 1e-9, "ratio {ratio}");
    }

    #[test]
    fn an_empty_day_is_an_error_not_a_zero_series() {
        let err = reconcile_day(&batch(Vec::new())).unwrap_err();
        assert!(matches!(err, ReconcileError::EmptyDay { .. }));

        let only_garbage = vec![record("garbage".to_string(), 1.0, 1.0, 1.0, 1.0)];
        let err = reconcile_day(&batch(only_garbage)).unwrap_err();
        assert!(matches!(err, ReconcileError::EmptyDay { .. }));
    }

    #[test]
    fn dropped_records_surface_as_a_warning() {
        let mut records = full_day_records();
        records.push(record("not-a-time".to_string(), 1.0, 1.0, 1.0, 1.0));
        let day = reconcile_day(&batch(records)).unwrap();

        assert!(day
            .warnings
            .contains(&QualityWarning::DroppedSamples { count: 1 }));
    }

    #[test]
    fn passthrough_channels_survive_untouched() {
        let day = reconcile_day(&batch(full_day_records())).unwrap();
        assert!(day.samples.iter().all(|s| s.battery_capacity == Some(55.0)));
        assert!(day.samples.iter().all(|s| s.ev_charger_power.is_none()));
    }
}
