use serde::{Deserialize, Deserializer, Serialize};

/// The one-shot registration a booth sends right after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub booth_id: u32,
    pub point: u32,
    pub is_entry: bool,
}

/// A request sent by a registered booth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Request {
    /// A vehicle arrived at an entry booth. A `null` vehicle id means the booth has nothing
    /// left to admit. The field itself is required.
    Entry {
        booth_id: u32,
        point: u32,
        #[serde(deserialize_with = "required_nullable")]
        vehicle_id: Option<String>,
    },
    /// An exit booth asks for the next vehicle to release.
    Exit { booth_id: u32, point: u32 },
}

impl Request {
    pub fn booth_id(&self) -> u32 {
        match self {
            Self::Entry { booth_id, .. } | Self::Exit { booth_id, .. } => *booth_id,
        }
    }

    pub fn point(&self) -> u32 {
        match self {
            Self::Entry { point, .. } | Self::Exit { point, .. } => *point,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Entry { .. } => "entry",
            Self::Exit { .. } => "exit",
        }
    }
}

/// Accepts `null` but, unlike a plain `Option` field, not a missing field.
fn required_nullable<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
}

/// The server's answer to a registration or a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    Success(Outcome),
    Failure { message: String },
    /// The simulation has ended, the booth should stop issuing requests.
    Complete,
}

impl Response {
    /// A bare success, used to acknowledge registrations.
    pub fn ack() -> Self {
        Self::Success(Outcome::default())
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure { message: message.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            Self::Success(outcome) => Some(outcome),
            _ => None,
        }
    }
}

/// Handler specific fields of a successful response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_point: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toll_fee: Option<f64>,
    /// Measured travel time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_time: Option<f64>,
}
