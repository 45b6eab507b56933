use std::time::Duration;

use toll_common::scale_duration;

use crate::{error::ConfigError, random::RandomSource, Point};

const DEFAULT_BASE_DELAY_PER_UNIT: Duration = Duration::from_secs(2);
const DEFAULT_LOW: f64 = 0.5;
const DEFAULT_HIGH: f64 = 1.5;

/// Estimates the minimum time a vehicle spends travelling between two points.
///
/// `|exit − entry| × base_delay_per_unit × uniform(low, high)`
///
/// The random multiplier spreads exit eligibility over a window instead of a fixed deadline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TravelTimeModel {
    base_delay_per_unit: Duration,
    low: f64,
    high: f64,
}

impl Default for TravelTimeModel {
    fn default() -> Self {
        Self {
            base_delay_per_unit: DEFAULT_BASE_DELAY_PER_UNIT,
            low: DEFAULT_LOW,
            high: DEFAULT_HIGH,
        }
    }
}

impl TravelTimeModel {
    pub fn new(base_delay_per_unit: Duration, low: f64, high: f64) -> Result<Self, ConfigError> {
        if !(low.is_finite() && high.is_finite() && low > 0.0 && low <= high) {
            return Err(ConfigError::InvalidDwellRange { low, high });
        }

        Ok(Self { base_delay_per_unit, low, high })
    }

    /// Same multiplier range, different base delay.
    pub fn with_base_delay(mut self, base_delay_per_unit: Duration) -> Self {
        self.base_delay_per_unit = base_delay_per_unit;
        self
    }

    pub fn base_delay_per_unit(&self) -> Duration {
        self.base_delay_per_unit
    }

    pub fn multiplier_range(&self) -> (f64, f64) {
        (self.low, self.high)
    }

    /// Samples the minimum dwell time between `entry` and `exit`.
    pub fn expected_dwell<R: RandomSource + ?Sized>(
        &self,
        entry: Point,
        exit: Point,
        rng: &mut R,
    ) -> Duration {
        let factor = rng.uniform(self.low, self.high);
        self.dwell_with_factor(entry, exit, factor)
    }

    /// The smallest dwell the model can produce between `entry` and `exit`.
    pub fn min_dwell(&self, entry: Point, exit: Point) -> Duration {
        self.dwell_with_factor(entry, exit, self.low)
    }

    /// The largest dwell the model can produce between `entry` and `exit`. Once this much
    /// time has passed, the vehicle is always eligible.
    pub fn max_dwell(&self, entry: Point, exit: Point) -> Duration {
        self.dwell_with_factor(entry, exit, self.high)
    }

    fn dwell_with_factor(&self, entry: Point, exit: Point, factor: f64) -> Duration {
        let distance = entry.abs_diff(exit) as f64;
        scale_duration(self.base_delay_per_unit, distance * factor)
    }
}
