use alphaess_client::domain::{Channel, DailyTotals, PowerQuad};

use super::series::{DaySeries, SlotKey};

const WATTS_PER_KW: f64 = 1000.0;
const SLOTS_PER_HOUR: f64 = 12.0;

#[derive(Debug, Default)]
pub struct UnitizeOutcome {
    /// Bucket energies in kWh, in slot order.
    pub energies: Vec<(SlotKey, PowerQuad)>,
    /// Channels that carried no signal at all; their buckets were zeroed
    /// instead of scaled.
    pub zero_channels: Vec<Channel>,
}

/// Rescale the averaged-power series so each channel sums to its
/// authoritative daily total.
///
/// Each bucket's average watts become an approximate bucket energy
/// (`watts / 1000 / 12` kWh for a 5-minute slot); the channel's buckets are
/// then rescaled by `authoritative_total / approximate_total`. That removes
/// the systematic bias of sampling gaps and averaging while preserving the
/// relative shape of the day, and the scaled sum matches the authoritative
/// total up to floating-point rounding.
///
/// A channel whose approximate total is zero has no shape to preserve;
/// scaling would divide by zero, so its buckets are emitted as zeros and the
/// channel is reported for a data-quality warning.
pub fn unitize(series: &DaySeries, totals: &DailyTotals) -> UnitizeOutcome {
    let approx: Vec<(SlotKey, PowerQuad)> = series
        .iter()
        .map(|(key, quad)| (*key, quad.scale(1.0 / WATTS_PER_KW / SLOTS_PER_HOUR)))
        .collect();

    let mut energies = approx.clone();
    let mut zero_channels = Vec::new();

    for channel in Channel::ALL {
        let approx_total: f64 = approx.iter().map(|(_, quad)| quad.get(channel)).sum();

        if approx_total == 0.0 {
            for (_, quad) in &mut energies {
                *quad.get_mut(channel) = 0.0;
            }
            zero_channels.push(channel);
            continue;
        }

        let factor = totals.get(channel) / approx_total;
        for (_, quad) in &mut energies {
            *quad.get_mut(channel) *= factor;
        }
    }

    UnitizeOutcome {
        energies,
        zero_channels,
    }
}
