use alphaess_client::domain::PowerQuad;

use super::series::{DaySeries, SlotKey, SLOT_MINUTES};

/// Fill missing buckets between known neighbours by linear interpolation.
///
/// Walks present keys in order; whenever two consecutive keys are more than
/// one 5-minute step apart, every missing bucket in between gets the value
/// `start + fraction * (end - start)` per channel, with `fraction` the
/// bucket's position in elapsed time across the gap. A single missing bucket
/// degenerates to the arithmetic mean of its neighbours. Known buckets are
/// never altered.
pub fn fill_gaps(series: &mut DaySeries) {
    let keys: Vec<SlotKey> = series.keys().copied().collect();

    for pair in keys.windows(2) {
        let (before, after) = (pair[0], pair[1]);
        if after.minute <= before.minute + SLOT_MINUTES {
            // Adjacent, or a folded twin of the same civil time.
            continue;
        }

        let start = series[&before];
        let end = series[&after];
        let span = f64::from(after.minute - before.minute);

        // Buckets inside a fold keep the fold; a gap touching the fold
        // boundary belongs to the ordinary day.
        let fold = before.fold && after.fold;

        let mut minute = before.minute + SLOT_MINUTES;
        while minute < after.minute {
            let fraction = f64::from(minute - before.minute) / span;
            series.insert(
                SlotKey { minute, fold },
                PowerQuad::lerp(&start, &end, fraction),
            );
            minute += SLOT_MINUTES;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(v: f64) -> PowerQuad {
        PowerQuad::new(v, v, v, v)
    }

    #[test]
    fn single_missing_bucket_becomes_the_neighbour_mean() {
        let mut series = DaySeries::new();
        series.insert(SlotKey::new(0), quad(10.0));
        series.insert(SlotKey::new(10), quad(20.0));

        fill_gaps(&mut series);

        assert_eq!(series.len(), 3);
        assert_eq!(series[&SlotKey::new(5)], quad(15.0));
    }

    #[test]
    fn longer_gaps_are_filled_linearly() {
        let mut series = DaySeries::new();
        series.insert(SlotKey::new(0), quad(0.0));
        series.insert(SlotKey::new(15), quad(3.0));

        fill_gaps(&mut series);

        assert_eq!(series.len(), 4);
        assert_eq!(series[&SlotKey::new(5)], quad(1.0));
        assert_eq!(series[&SlotKey::new(10)], quad(2.0));
    }

    #[test]
    fn known_buckets_are_never_altered() {
        let mut series = DaySeries::new();
        series.insert(SlotKey::new(0), quad(5.0));
        series.insert(SlotKey::new(5), quad(100.0));
        series.insert(SlotKey::new(20), quad(8.0));

        fill_gaps(&mut series);

        assert_eq!(series[&SlotKey::new(0)], quad(5.0));
        assert_eq!(series[&SlotKey::new(5)], quad(100.0));
        assert_eq!(series[&SlotKey::new(20)], quad(8.0));
    }

    #[test]
    fn result_is_contiguous_between_first_and_last_key() {
        let mut series = DaySeries::new();
        series.insert(SlotKey::new(0), quad(0.0));
        series.insert(SlotKey::new(40), quad(4.0));
        series.insert(SlotKey::new(60), quad(1.0));

        fill_gaps(&mut series);

        let minutes: Vec<u16> = series.keys().map(|k| k.minute).collect();
        let expected: Vec<u16> = (0..=60).step_by(5).collect();
        assert_eq!(minutes, expected);
    }

    #[test]
    fn folded_twin_of_a_civil_time_is_not_a_gap() {
        let mut series = DaySeries::new();
        series.insert(SlotKey::new(120), quad(1.0));
        series.insert(SlotKey::folded(120), quad(2.0));
        series.insert(SlotKey::new(125), quad(3.0));

        fill_gaps(&mut series);

        assert_eq!(series.len(), 3);
    }

    #[test]
    fn gaps_inside_a_fold_are_filled_as_folded_buckets() {
        let mut series = DaySeries::new();
        series.insert(SlotKey::folded(120), quad(0.0));
        series.insert(SlotKey::folded(130), quad(2.0));

        fill_gaps(&mut series);

        assert_eq!(series[&SlotKey::folded(125)], quad(1.0));
        assert!(!series.contains_key(&SlotKey::new(125)));
    }
}
