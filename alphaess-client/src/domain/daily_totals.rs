use super::Channel;

/// Authoritative per-day energy readings in kWh, reported by the inverter
/// cloud independently of the per-minute telemetry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyTotals {
    pub pv_kwh: f64,
    pub feed_in_kwh: f64,
    pub grid_import_kwh: f64,
}

impl DailyTotals {
    /// Consumption is not reported upstream; it is implied by the balance
    /// `pv - feed_in + grid_import`.
    pub fn load_kwh(&self) -> f64 {
        self.pv_kwh - self.feed_in_kwh + self.grid_import_kwh
    }

    pub fn get(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Pv => self.pv_kwh,
            Channel::Load => self.load_kwh(),
            Channel::FeedIn => self.feed_in_kwh,
            Channel::GridImport => self.grid_import_kwh,
        }
    }
}
