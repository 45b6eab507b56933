use std::time::Duration;

use thiserror::Error;

mod driver;
mod registrar;
mod reporter;
mod session;
mod socket;
mod stats;

pub use reporter::summary;
pub use socket::*;
pub use stats::PlazaStats;

const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum PlazaError {
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("Wire protocol error: {0:?}")]
    Wire(#[from] toll_wire::Error),
    #[error("Registration rejected: {0}")]
    Rejected(String),
    #[error("Socket closed")]
    SocketClosed,
    #[error("No valid endpoints to bind to")]
    NoValidEndpoints,
}

#[derive(Debug, Clone)]
pub struct PlazaOptions {
    /// Interval between statistics summaries. `None` disables the reporter.
    stats_interval: Option<Duration>,
    /// Maximum size of a single incoming frame.
    max_frame_len: usize,
    /// Sets `TCP_NODELAY` on accepted connections.
    set_nodelay: bool,
}

impl Default for PlazaOptions {
    fn default() -> Self {
        Self {
            stats_interval: Some(DEFAULT_STATS_INTERVAL),
            max_frame_len: toll_wire::codec::DEFAULT_MAX_FRAME_LEN,
            set_nodelay: true,
        }
    }
}

impl PlazaOptions {
    /// Sets the interval between statistics summaries. A zero interval disables them.
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    /// Sets the maximum size of a single incoming frame.
    pub fn max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn set_nodelay(mut self, set_nodelay: bool) -> Self {
        self.set_nodelay = set_nodelay;
        self
    }
}

/// The plaza socket state, shared between the driver task, booth sessions and the socket.
#[derive(Debug, Default)]
pub(crate) struct SocketState {
    pub(crate) stats: PlazaStats,
}
