use std::time::Duration;

use thiserror::Error;

mod backoff;
mod generator;
mod simulation;
mod socket;

pub use backoff::ExponentialBackoff;
pub use generator::VehicleGenerator;
pub use simulation::*;
pub use socket::*;

#[derive(Debug, Error)]
pub enum BoothError {
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("Wire protocol error: {0:?}")]
    Wire(#[from] toll_wire::Error),
    #[error("Registration rejected: {0}")]
    Rejected(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Socket closed")]
    SocketClosed,
    #[error("Request timed out")]
    Timeout,
}

impl BoothError {
    /// Whether the connection is unusable after this error and should be re-established.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Wire(_) | Self::SocketClosed | Self::Timeout)
    }
}

#[derive(Debug, Clone)]
pub struct BoothOptions {
    /// How long to wait for a response.
    pub timeout: Duration,
    /// Initial delay between reconnection attempts. Doubles on every attempt.
    pub backoff_duration: Duration,
    /// Upper bound for the reconnection delay.
    pub max_backoff: Duration,
    /// Reconnection attempts before giving up. `None` retries forever.
    pub retry_attempts: Option<usize>,
    pub set_nodelay: bool,
}

impl Default for BoothOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            backoff_duration: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
            retry_attempts: Some(8),
            set_nodelay: true,
        }
    }
}

impl BoothOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.backoff_duration = initial;
        self.max_backoff = max;
        self
    }

    pub fn retry_attempts(mut self, retry_attempts: Option<usize>) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }
}
