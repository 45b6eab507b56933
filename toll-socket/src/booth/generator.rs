use rustc_hash::FxHashSet;

use toll_ledger::{RandomSource, StdRandom};

const VEHICLE_KINDS: [&str; 5] = ["CAR", "SUV", "TRUCK", "VAN", "BUS"];
const PLATE_NUMBERS: usize = 1000;

/// Issues unique vehicle ids of the form `CAR042`, up to a fixed number of vehicles.
pub struct VehicleGenerator<R: RandomSource = StdRandom> {
    issued: FxHashSet<String>,
    limit: usize,
    rng: R,
}

impl VehicleGenerator {
    pub fn new(limit: usize) -> Self {
        Self::with_random(limit, StdRandom::from_entropy())
    }
}

impl<R: RandomSource> VehicleGenerator<R> {
    /// The limit is clamped to the number of distinct ids available.
    pub fn with_random(limit: usize, rng: R) -> Self {
        let limit = limit.min(VEHICLE_KINDS.len() * PLATE_NUMBERS);
        Self { issued: FxHashSet::default(), limit, rng }
    }

    /// Returns a fresh id, or `None` once the limit has been issued.
    pub fn next_id(&mut self) -> Option<String> {
        if self.issued.len() >= self.limit {
            return None;
        }

        loop {
            let kind = VEHICLE_KINDS[self.rng.pick(VEHICLE_KINDS.len())];
            let id = format!("{kind}{:03}", self.rng.pick(PLATE_NUMBERS));

            if self.issued.insert(id.clone()) {
                return Some(id);
            }
        }
    }

    pub fn issued(&self) -> usize {
        self.issued.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
