use crate::{error::ConfigError, BoothId, Point};

const DEFAULT_POINTS: u32 = 18;
const DEFAULT_BOOTHS_PER_PLAZA: u32 = 6;
const DEFAULT_BOOTHS_PER_REGULAR: u32 = 4;
const DEFAULT_RATE_PER_UNIT: f64 = 2.0;

/// The highway layout: an ordered set of points, some of which are plazas with more booths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    points: u32,
    plaza_points: Vec<Point>,
    booths_per_plaza: u32,
    booths_per_regular: u32,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            points: DEFAULT_POINTS,
            plaza_points: vec![0, DEFAULT_POINTS - 1],
            booths_per_plaza: DEFAULT_BOOTHS_PER_PLAZA,
            booths_per_regular: DEFAULT_BOOTHS_PER_REGULAR,
        }
    }
}

impl Network {
    /// Creates a network of `points` points with plazas at both ends.
    pub fn new(points: u32) -> Result<Self, ConfigError> {
        if points == 0 {
            return Err(ConfigError::NoPoints);
        }

        let mut plaza_points = vec![0];
        if points > 1 {
            plaza_points.push(points - 1);
        }

        Ok(Self { points, plaza_points, ..Self::default() })
    }

    /// Overrides the plaza points.
    pub fn with_plaza_points(mut self, plaza_points: Vec<Point>) -> Result<Self, ConfigError> {
        if let Some(&p) = plaza_points.iter().find(|p| !self.contains(**p)) {
            return Err(ConfigError::PlazaOutOfRange(p));
        }

        self.plaza_points = plaza_points;
        Ok(self)
    }

    /// Sets the booth counts provisioned at plaza and regular points.
    pub fn with_booths(mut self, per_plaza: u32, per_regular: u32) -> Result<Self, ConfigError> {
        if per_plaza == 0 || per_regular == 0 {
            return Err(ConfigError::NoBooths);
        }

        self.booths_per_plaza = per_plaza;
        self.booths_per_regular = per_regular;
        Ok(self)
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    pub fn contains(&self, point: Point) -> bool {
        point < self.points
    }

    pub fn last_point(&self) -> Point {
        self.points - 1
    }

    pub fn is_plaza(&self, point: Point) -> bool {
        self.plaza_points.contains(&point)
    }

    /// Number of booths provisioned at `point`, or 0 if the point isn't on the network.
    pub fn booths_at(&self, point: Point) -> u32 {
        if !self.contains(point) {
            0
        } else if self.is_plaza(point) {
            self.booths_per_plaza
        } else {
            self.booths_per_regular
        }
    }

    /// Number of entry booths at `point`. The remaining booths are exit booths.
    pub fn entry_booths_at(&self, point: Point) -> u32 {
        if self.contains(point) {
            (self.booths_at(point) / 2).max(1)
        } else {
            0
        }
    }

    /// Whether `booth_id` is a provisioned booth at `point`. Booth ids start at 1.
    pub fn has_booth(&self, point: Point, booth_id: BoothId) -> bool {
        (1..=self.booths_at(point)).contains(&booth_id)
    }

    /// Total number of booths across the network.
    pub fn total_booths(&self) -> u32 {
        (0..self.points).map(|p| self.booths_at(p)).sum()
    }
}

/// Toll pricing: a flat rate per unit of distance travelled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tariff {
    rate_per_unit: f64,
}

impl Default for Tariff {
    fn default() -> Self {
        Self { rate_per_unit: DEFAULT_RATE_PER_UNIT }
    }
}

impl Tariff {
    pub fn new(rate_per_unit: f64) -> Result<Self, ConfigError> {
        if !rate_per_unit.is_finite() || rate_per_unit < 0.0 {
            return Err(ConfigError::InvalidRate(rate_per_unit));
        }

        Ok(Self { rate_per_unit })
    }

    pub fn rate_per_unit(&self) -> f64 {
        self.rate_per_unit
    }

    /// `|exit − entry| × rate`.
    #[inline]
    pub fn fee(&self, entry: Point, exit: Point) -> f64 {
        entry.abs_diff(exit) as f64 * self.rate_per_unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toll_formula() {
        let tariff = Tariff::new(2.0).unwrap();

        assert_eq!(tariff.fee(2, 9), 14.0);
        assert_eq!(tariff.fee(9, 2), 14.0);
        assert_eq!(tariff.fee(4, 4), 0.0);
    }

    #[test]
    fn invalid_rate() {
        assert!(Tariff::new(-1.0).is_err());
        assert!(Tariff::new(f64::INFINITY).is_err());
    }

    #[test]
    fn default_booth_provisioning() {
        let network = Network::default();

        assert_eq!(network.booths_at(0), 6);
        assert_eq!(network.booths_at(17), 6);
        assert_eq!(network.booths_at(5), 4);
        assert_eq!(network.booths_at(18), 0);
        assert_eq!(network.entry_booths_at(0), 3);
        assert_eq!(network.entry_booths_at(5), 2);
        assert_eq!(network.total_booths(), 2 * 6 + 16 * 4);

        assert!(network.has_booth(0, 6));
        assert!(!network.has_booth(5, 5));
        assert!(!network.has_booth(5, 0));
    }

    #[test]
    fn custom_network() {
        let network = Network::new(3).unwrap().with_booths(2, 1).unwrap();

        assert_eq!(network.last_point(), 2);
        assert_eq!(network.booths_at(1), 1);
        assert_eq!(network.entry_booths_at(1), 1);

        assert!(Network::new(0).is_err());
        assert!(Network::new(3).unwrap().with_plaza_points(vec![3]).is_err());
    }
}
