use serde::{Serialize, Serializer};

use crate::{
    ledger::{EntryReceipt, ExitReceipt},
    BoothId, Point,
};

/// Booth identifier written for exits the system performs on a booth's behalf.
pub const SYSTEM_ORIGIN: &str = "SYSTEM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventAction {
    Entry,
    Exit,
    #[serde(rename = "Forced Exit")]
    ForcedExit,
}

/// Who caused an event. Serialized as the booth number, or `"SYSTEM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    Booth(BoothId),
    System,
}

impl Serialize for EventOrigin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Booth(id) => serializer.serialize_u32(*id),
            Self::System => serializer.serialize_str(SYSTEM_ORIGIN),
        }
    }
}

/// A transaction log record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TollEvent {
    pub action: EventAction,
    pub vehicle_id: String,
    pub entry_point: Point,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_point: Option<Point>,
    pub booth_id: EventOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toll_fee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub travel_time: Option<f64>,
    /// UNIX timestamp in microseconds.
    pub timestamp: u64,
}

impl From<&EntryReceipt> for TollEvent {
    fn from(receipt: &EntryReceipt) -> Self {
        Self {
            action: EventAction::Entry,
            vehicle_id: receipt.vehicle_id.clone(),
            entry_point: receipt.entry_point,
            exit_point: None,
            booth_id: EventOrigin::Booth(receipt.booth_id),
            toll_fee: None,
            travel_time: None,
            timestamp: receipt.timestamp,
        }
    }
}

impl From<&ExitReceipt> for TollEvent {
    fn from(receipt: &ExitReceipt) -> Self {
        let (action, booth_id) = match receipt.booth_id {
            Some(id) => (EventAction::Exit, EventOrigin::Booth(id)),
            None => (EventAction::ForcedExit, EventOrigin::System),
        };

        Self {
            action,
            vehicle_id: receipt.vehicle_id.clone(),
            entry_point: receipt.entry_point,
            exit_point: Some(receipt.exit_point),
            booth_id,
            toll_fee: Some(receipt.toll_fee),
            travel_time: Some(receipt.travel_time),
            timestamp: receipt.timestamp,
        }
    }
}
