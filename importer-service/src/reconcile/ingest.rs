use alphaess_client::domain::{PowerQuad, RawPowerRecord};
use time::{format_description::BorrowedFormatItem, macros::format_description, Date, PrimitiveDateTime};

/// Wall-clock format of the upstream `uploadTime` field.
static UPLOAD_TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// A wall-clock regression of at least this many minutes opens the DST fold.
const DST_REGRESSION_MINUTES: u16 = 55;

/// One typed telemetry reading for the day being reconciled.
///
/// `fold` is `true` for readings taken during the second pass through a
/// wall-clock hour repeated by a DST fall-back transition; the resampler
/// keeps folded readings in separate buckets so the repeat stays visible
/// until the DST reconciler collapses it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub ts: PrimitiveDateTime,
    pub fold: bool,
    pub power: PowerQuad,
    pub battery_capacity: Option<f64>,
    pub ev_charger_power: Option<f64>,
}

impl RawSample {
    pub fn minute_of_day(&self) -> u16 {
        u16::from(self.ts.hour()) * 60 + u16::from(self.ts.minute())
    }
}

#[derive(Debug, Default)]
pub struct IngestOutcome {
    /// Samples in slot order: ascending timestamp, folded pass last within a
    /// repeated wall-clock time.
    pub samples: Vec<RawSample>,
    /// Records dropped for an unparsable timestamp or a foreign date.
    pub dropped: usize,
}

/// Parse one day of raw records into typed, ordered samples.
///
/// A record whose timestamp cannot be parsed, or which belongs to a different
/// calendar day, is dropped with a warning; one bad record must not discard
/// the rest of the day. Duplicate timestamps are kept; the resampler
/// averages them.
pub fn ingest(date: Date, records: &[RawPowerRecord]) -> IngestOutcome {
    let mut outcome = IngestOutcome::default();

    // Fold bookkeeping: `high_water` is the largest minute-of-day seen on the
    // first pass; a regression of an hour against it means local clocks fell
    // back and the repeated hour is replaying. At most one fold per day.
    let mut high_water: Option<u16> = None;
    let mut folding = false;
    let mut fold_seen = false;

    for record in records {
        let ts = match PrimitiveDateTime::parse(record.upload_time.trim(), UPLOAD_TIME_FORMAT) {
            Ok(ts) => ts,
            Err(e) => {
                tracing::warn!(
                    upload_time = %record.upload_time,
                    error = %e,
                    "dropping sample with unparsable timestamp"
                );
                outcome.dropped += 1;
                continue;
            }
        };

        if ts.date() != date {
            tracing::warn!(
                upload_time = %record.upload_time,
                expected_date = %date,
                "dropping sample outside the day being reconciled"
            );
            outcome.dropped += 1;
            continue;
        }

        let minute = u16::from(ts.hour()) * 60 + u16::from(ts.minute());
        match high_water {
            Some(hw) if !folding && !fold_seen && minute + DST_REGRESSION_MINUTES <= hw => {
                folding = true;
                fold_seen = true;
            }
            Some(hw) if folding && minute > hw => {
                folding = false;
            }
            _ => {}
        }
        if !folding {
            high_water = Some(high_water.map_or(minute, |hw| hw.max(minute)));
        }

        outcome.samples.push(RawSample {
            ts,
            fold: folding,
            power: PowerQuad::new(record.pv, record.load, record.feed_in, record.grid_import),
            battery_capacity: record.battery_capacity,
            ev_charger_power: record.ev_charger_power,
        });
    }

    outcome.samples.sort_by_key(|s| (s.ts, s.fold));
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn record(upload_time: &str, pv: f64) -> RawPowerRecord {
        RawPowerRecord {
            upload_time: upload_time.to_string(),
            pv,
            load: 0.0,
            feed_in: 0.0,
            grid_import: 0.0,
            battery_capacity: None,
            ev_charger_power: None,
        }
    }

    #[test]
    fn parses_and_orders_samples() {
        let records = vec![
            record("2024-06-01 00:10:00", 2.0),
            record("2024-06-01 00:05:00", 1.0),
        ];
        let outcome = ingest(date!(2024 - 06 - 01), &records);

        assert_eq!(outcome.dropped, 0);
        assert_eq!(outcome.samples.len(), 2);
        assert_eq!(outcome.samples[0].power.pv, 1.0);
        assert_eq!(outcome.samples[0].minute_of_day(), 5);
        assert_eq!(outcome.samples[1].minute_of_day(), 10);
    }

    #[test]
    fn drops_unparsable_timestamps_and_keeps_the_rest() {
        let records = vec![
            record("not a timestamp", 1.0),
            record("2024-06-01 12:00:00", 3.0),
        ];
        let outcome = ingest(date!(2024 - 06 - 01), &records);

        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.samples.len(), 1);
        assert_eq!(outcome.samples[0].power.pv, 3.0);
    }

    #[test]
    fn drops_samples_from_another_day() {
        let records = vec![
            record("2024-06-02 00:00:00", 1.0),
            record("2024-06-01 08:00:00", 2.0),
        ];
        let outcome = ingest(date!(2024 - 06 - 01), &records);

        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.samples.len(), 1);
    }

    #[test]
    fn fall_back_replay_is_folded_until_the_clock_catches_up() {
        // 02:50, 02:55, then the clock falls back: 02:00 again, 02:05, …,
        // 02:55 replayed, then 03:00 onwards is new wall-clock territory.
        let records = vec![
            record("2024-10-27 02:50:00", 1.0),
            record("2024-10-27 02:55:00", 2.0),
            record("2024-10-27 02:00:00", 3.0),
            record("2024-10-27 02:55:00", 4.0),
            record("2024-10-27 03:00:00", 5.0),
        ];
        let outcome = ingest(date!(2024 - 10 - 27), &records);

        let folds: Vec<bool> = outcome.samples.iter().map(|s| s.fold).collect();
        let pvs: Vec<f64> = outcome.samples.iter().map(|s| s.power.pv).collect();

        // Slot order: first pass, then the folded replay, then the new hour.
        assert_eq!(pvs, vec![3.0, 1.0, 2.0, 4.0, 5.0]);
        assert_eq!(folds, vec![true, false, false, true, false]);
    }

    #[test]
    fn small_out_of_order_jitter_does_not_open_a_fold() {
        let records = vec![
            record("2024-06-01 10:10:00", 1.0),
            record("2024-06-01 10:00:00", 2.0),
            record("2024-06-01 10:15:00", 3.0),
        ];
        let outcome = ingest(date!(2024 - 06 - 01), &records);

        assert!(outcome.samples.iter().all(|s| !s.fold));
        assert_eq!(outcome.samples.len(), 3);
    }
}
