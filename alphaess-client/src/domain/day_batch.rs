use time::Date;

use super::DailyTotals;

/// One raw telemetry record exactly as it crosses the ingress boundary:
/// an unparsed local-time string plus the power channels in watts.
///
/// Live-fetch and batch-file ingress both normalize to this shape, so a day
/// reconciles bit-identically regardless of where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPowerRecord {
    /// Local wall-clock timestamp, `"YYYY-MM-DD HH:mm:ss"`.
    pub upload_time: String,
    pub pv: f64,
    pub load: f64,
    pub feed_in: f64,
    pub grid_import: f64,
    pub battery_capacity: Option<f64>,
    pub ev_charger_power: Option<f64>,
}

/// Everything the reconciliation core needs for one `(device, day)`:
/// the day's raw telemetry and the authoritative daily totals.
#[derive(Debug, Clone)]
pub struct DayBatch {
    pub device_id: String,
    pub date: Date,
    pub records: Vec<RawPowerRecord>,
    pub totals: DailyTotals,
}
