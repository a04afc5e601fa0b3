mod daily_totals;
mod day_batch;
mod power_sample;
mod quad;
mod reconciled_interval;

pub use daily_totals::DailyTotals;
pub use day_batch::{DayBatch, RawPowerRecord};
pub use power_sample::PowerSample;
pub use quad::{Channel, PowerQuad};
pub use reconciled_interval::ReconciledInterval;
