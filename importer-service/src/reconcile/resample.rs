use std::collections::BTreeMap;

use alphaess_client::domain::PowerQuad;

use super::ingest::RawSample;
use super::series::{DaySeries, SlotKey, LAST_SLOT_MINUTE, SLOT_MINUTES};

/// Bucket samples into fixed 5-minute windows, averaging within each bucket.
///
/// Every sample lands in the bucket at `minute_of_day - minute_of_day % 5`
/// (folded samples in the folded bucket of the same minute). Averaging
/// absorbs sub-5-minute noise and duplicate readings at the same wall-clock
/// minute. Windows with no samples are simply absent; later stages fill them.
pub fn resample(samples: &[RawSample]) -> DaySeries {
    let mut acc: BTreeMap<SlotKey, (PowerQuad, u32)> = BTreeMap::new();

    for sample in samples {
        let minute = sample.minute_of_day();
        let key = SlotKey {
            minute: minute - minute % SLOT_MINUTES,
            fold: sample.fold,
        };
        let entry = acc.entry(key).or_insert((PowerQuad::default(), 0));
        entry.0 += sample.power;
        entry.1 += 1;
    }

    acc.into_iter()
        .map(|(key, (sum, count))| (key, sum.scale(1.0 / f64::from(count))))
        .collect()
}

/// Guarantee buckets at local midnight and 23:55.
///
/// Telemetry routinely starts after 00:00 or stops before 23:55. The gap
/// filler needs defined endpoints and the unitizer needs full day coverage,
/// so a missing boundary becomes a zero-valued bucket (approximately zero
/// activity) instead of a silently shorter day.
pub fn pad_boundaries(series: &mut DaySeries) {
    series
        .entry(SlotKey::new(0))
        .or_insert_with(PowerQuad::default);
    series
        .entry(SlotKey::new(LAST_SLOT_MINUTE))
        .or_insert_with(PowerQuad::default);
}
