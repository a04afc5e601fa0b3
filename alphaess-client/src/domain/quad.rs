use std::ops::{Add, AddAssign};

/// The four reconciled channels of one inverter reading or bucket.
///
/// Units are whatever the surrounding stage says they are: averaged watts
/// while resampling, kWh after unitization. Battery charge is never stored;
/// it is derived from the other four via [`PowerQuad::charge`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PowerQuad {
    pub pv: f64,
    pub load: f64,
    pub feed_in: f64,
    pub grid_import: f64,
}

/// Identifies one of the four reconciled channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Pv,
    Load,
    FeedIn,
    GridImport,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Pv,
        Channel::Load,
        Channel::FeedIn,
        Channel::GridImport,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Pv => "pv",
            Channel::Load => "load",
            Channel::FeedIn => "feed_in",
            Channel::GridImport => "grid_import",
        }
    }
}

impl PowerQuad {
    pub fn new(pv: f64, load: f64, feed_in: f64, grid_import: f64) -> Self {
        Self {
            pv,
            load,
            feed_in,
            grid_import,
        }
    }

    /// Energy-balance-implied net battery charge: positive while charging,
    /// negative while discharging.
    pub fn charge(&self) -> f64 {
        (self.pv + self.grid_import) - (self.load + self.feed_in)
    }

    pub fn get(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Pv => self.pv,
            Channel::Load => self.load,
            Channel::FeedIn => self.feed_in,
            Channel::GridImport => self.grid_import,
        }
    }

    pub fn get_mut(&mut self, channel: Channel) -> &mut f64 {
        match channel {
            Channel::Pv => &mut self.pv,
            Channel::Load => &mut self.load,
            Channel::FeedIn => &mut self.feed_in,
            Channel::GridImport => &mut self.grid_import,
        }
    }

    pub fn scale(&self, factor: f64) -> Self {
        Self {
            pv: self.pv * factor,
            load: self.load * factor,
            feed_in: self.feed_in * factor,
            grid_import: self.grid_import * factor,
        }
    }

    /// Channel-wise linear interpolation between `start` and `end`.
    pub fn lerp(start: &Self, end: &Self, fraction: f64) -> Self {
        Self {
            pv: start.pv + fraction * (end.pv - start.pv),
            load: start.load + fraction * (end.load - start.load),
            feed_in: start.feed_in + fraction * (end.feed_in - start.feed_in),
            grid_import: start.grid_import + fraction * (end.grid_import - start.grid_import),
        }
    }
}

impl Add for PowerQuad {
    type Output = PowerQuad;

    fn add(self, rhs: PowerQuad) -> PowerQuad {
        PowerQuad {
            pv: self.pv + rhs.pv,
            load: self.load + rhs.load,
            feed_in: self.feed_in + rhs.feed_in,
            grid_import: self.grid_import + rhs.grid_import,
        }
    }
}

impl AddAssign for PowerQuad {
    fn add_assign(&mut self, rhs: PowerQuad) {
        *self = *self + rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_is_derived_from_the_other_four() {
        let quad = PowerQuad::new(3000.0, 1200.0, 1500.0, 100.0);
        assert_eq!(quad.charge(), (3000.0 + 100.0) - (1200.0 + 1500.0));
    }

    #[test]
    fn lerp_midpoint_is_the_mean() {
        let a = PowerQuad::new(0.0, 10.0, 20.0, 30.0);
        let b = PowerQuad::new(10.0, 20.0, 40.0, 30.0);
        let mid = PowerQuad::lerp(&a, &b, 0.5);
        assert_eq!(mid, PowerQuad::new(5.0, 15.0, 30.0, 30.0));
    }

    #[test]
    fn get_and_get_mut_address_the_same_field() {
        let mut quad = PowerQuad::default();
        for channel in Channel::ALL {
            *quad.get_mut(channel) = 7.0;
            assert_eq!(quad.get(channel), 7.0);
        }
    }
}
