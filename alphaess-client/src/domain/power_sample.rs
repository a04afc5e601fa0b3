use time::PrimitiveDateTime;

/// One parsed telemetry reading, local wall-clock time, instantaneous watts.
///
/// `battery_capacity` and `ev_charger_power` are collected upstream but never
/// reconciled; they ride along untouched for raw archiving.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PowerSample {
    pub device_id: String,
    pub ts: PrimitiveDateTime,
    pub pv_w: f64,
    pub load_w: f64,
    pub feed_in_w: f64,
    pub grid_import_w: f64,
    pub battery_capacity: Option<f64>,
    pub ev_charger_power: Option<f64>,
}
