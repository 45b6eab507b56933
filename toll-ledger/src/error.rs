use thiserror::Error;

use crate::{BoothHandle, BoothKey};

/// Reasons an entry is refused. None of these mutate the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("Vehicle {0} is already on the highway")]
    AlreadyOnHighway(String),
    #[error("Vehicle {0} has already completed its journey")]
    AlreadyCompleted(String),
    #[error("Vehicle id must not be empty")]
    InvalidVehicleId,
    #[error("{0} is not an entry booth")]
    NotAnEntryBooth(BoothKey),
    #[error("Simulation complete")]
    SimulationComplete,
}

impl EntryError {
    /// Whether this refusal is a conflict with existing vehicle state.
    pub fn is_state_conflict(&self) -> bool {
        matches!(self, Self::AlreadyOnHighway(_) | Self::AlreadyCompleted(_))
    }
}

/// Reasons an exit request releases nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExitError {
    /// Nothing can leave here yet. This is the normal idle outcome of an exit booth.
    #[error("No eligible vehicle for exit at point {0}")]
    NoEligibleVehicle(u32),
    #[error("{0} is not an exit booth")]
    NotAnExitBooth(BoothKey),
    #[error("Simulation complete")]
    SimulationComplete,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{key} is already connected from {}", existing.peer)]
pub struct BoothConflict {
    pub key: BoothKey,
    pub existing: BoothHandle,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Network needs at least one point")]
    NoPoints,
    #[error("Plaza point {0} is outside the network")]
    PlazaOutOfRange(u32),
    #[error("Booth count must be at least 1")]
    NoBooths,
    #[error("Toll rate must be a finite, non-negative number (got {0})")]
    InvalidRate(f64),
    #[error("Dwell multiplier range must satisfy 0 < low <= high (got {low}..{high})")]
    InvalidDwellRange { low: f64, high: f64 },
}
