//! The authoritative record of which vehicles are on the highway, and the policy deciding
//! when and where they may leave it.

use std::fmt;

use serde::{Deserialize, Serialize};

mod error;
mod event;
mod ledger;
mod network;
mod random;
mod travel;

pub use error::{BoothConflict, ConfigError, EntryError, ExitError};
pub use event::{EventAction, EventOrigin, TollEvent};
pub use ledger::{
    BoothHandle, EntryReceipt, ExitReceipt, Ledger, LedgerOptions, LedgerStats, VehicleRecord,
    VehicleStatus,
};
pub use network::{Network, Tariff};
pub use random::{RandomSource, StdRandom};
pub use travel::TravelTimeModel;

/// An ordered highway location index, `0..N`.
pub type Point = u32;
/// A booth number, unique per point.
pub type BoothId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Entry,
    Exit,
}

impl Direction {
    pub fn from_is_entry(is_entry: bool) -> Self {
        if is_entry {
            Self::Entry
        } else {
            Self::Exit
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self, Self::Entry)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry => f.write_str("entry"),
            Self::Exit => f.write_str("exit"),
        }
    }
}

/// Uniquely names a connected booth session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoothKey {
    pub point: Point,
    pub booth_id: BoothId,
    pub direction: Direction,
}

impl BoothKey {
    pub fn new(point: Point, booth_id: BoothId, direction: Direction) -> Self {
        Self { point, booth_id, direction }
    }

    pub fn entry(point: Point, booth_id: BoothId) -> Self {
        Self::new(point, booth_id, Direction::Entry)
    }

    pub fn exit(point: Point, booth_id: BoothId) -> Self {
        Self::new(point, booth_id, Direction::Exit)
    }
}

impl fmt::Display for BoothKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} booth {} @ point {}", self.direction, self.booth_id, self.point)
    }
}
