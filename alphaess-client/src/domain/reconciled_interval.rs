use time::Date;

/// One 5-minute slot of a reconciled daily series, all channels in kWh.
///
/// Uniquely keyed by `(device_id, date, minute_of_day)`; a full day is 288
/// rows at minutes 0, 5, …, 1435.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ReconciledInterval {
    pub device_id: String,
    pub date: Date,
    pub minute_of_day: i32,
    pub pv_kwh: f64,
    pub load_kwh: f64,
    pub feed_in_kwh: f64,
    pub grid_import_kwh: f64,
}

impl ReconciledInterval {
    /// Net battery charge for the slot, implied by the energy balance.
    pub fn charge_kwh(&self) -> f64 {
        (self.pv_kwh + self.grid_import_kwh) - (self.load_kwh + self.feed_in_kwh)
    }
}
