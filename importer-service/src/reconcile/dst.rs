use super::series::{DaySeries, SLOTS_PER_DAY};

/// How the day's bucket count resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayShape {
    /// The expected 288 buckets.
    Normal,
    /// 289 buckets: a DST fall-back duplicated one civil slot, now collapsed.
    DstFallback,
}

/// A bucket count this stage refuses to repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrregularCount(pub usize);

/// Collapse the one known DST anomaly.
///
/// A fall-back day replays a wall-clock hour; when exactly one replayed slot
/// survives resampling the day holds 289 buckets. The first civil time
/// present under two distinct keys is merged by summing into the earlier key
/// and removing the later one: energy for the duplicated slot is conserved
/// and the civil-time repeat collapses to one canonical bucket.
///
/// This is deliberately narrow: it fires only on a count of exactly 289.
/// Any other irregular count is returned as [`IrregularCount`] for the
/// caller to report rather than silently interpolated over.
pub fn reconcile_dst(series: &mut DaySeries) -> Result<DayShape, IrregularCount> {
    match series.len() {
        SLOTS_PER_DAY => Ok(DayShape::Normal),
        n if n == SLOTS_PER_DAY + 1 => {
            collapse_first_duplicate(series);
            Ok(DayShape::DstFallback)
        }
        n => Err(IrregularCount(n)),
    }
}

fn collapse_first_duplicate(series: &mut DaySeries) {
    // Keys order as (minute, fold), so a duplicated civil time appears as two
    // adjacent keys with the same minute; 289 keys over 288 possible minutes
    // guarantee one exists.
    let keys: Vec<_> = series.keys().copied().collect();
    for pair in keys.windows(2) {
        let (earlier, later) = (pair[0], pair[1]);
        if earlier.minute == later.minute {
            let duplicate = series
                .remove(&later)
                .unwrap_or_default();
            if let Some(kept) = series.get_mut(&earlier) {
                *kept += duplicate;
            }
            return;
        }
    }
}
