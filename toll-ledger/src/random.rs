use rand::{rngs::StdRng, Rng, SeedableRng};

/// Source of randomness for dwell times and candidate selection.
///
/// The ledger draws from this under its lock, so implementations need no synchronization of
/// their own. Tests substitute a scripted source to pin candidate choice.
pub trait RandomSource: Send + 'static {
    /// Returns a value drawn uniformly from `[low, high]`.
    fn uniform(&mut self, low: f64, high: f64) -> f64;

    /// Returns an index drawn uniformly from `0..len`. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;
}

/// The default [`RandomSource`], backed by [`StdRng`].
#[derive(Debug, Clone)]
pub struct StdRandom(StdRng);

impl StdRandom {
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    /// A reproducible source.
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl Default for StdRandom {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl RandomSource for StdRandom {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if low >= high {
            return low;
        }

        self.0.gen_range(low..=high)
    }

    fn pick(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }

        self.0.gen_range(0..len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_is_reproducible() {
        let mut a = StdRandom::seeded(7);
        let mut b = StdRandom::seeded(7);

        for _ in 0..32 {
            assert_eq!(a.pick(10), b.pick(10));
            assert_eq!(a.uniform(0.5, 1.5), b.uniform(0.5, 1.5));
        }
    }

    #[test]
    fn stays_in_range() {
        let mut rng = StdRandom::seeded(1);

        for _ in 0..1000 {
            let x = rng.uniform(0.5, 1.5);
            assert!((0.5..=1.5).contains(&x));
            assert!(rng.pick(3) < 3);
        }

        assert_eq!(rng.uniform(2.0, 2.0), 2.0);
        assert_eq!(rng.pick(1), 0);
    }
}
