//! Sockets for the toll network.
//!
//! - [`PlazaSocket`] is the coordination server. It accepts booth connections, runs the
//!   registration handshake, and serves each booth from its own session task against a shared
//!   [`Ledger`](toll_ledger::Ledger).
//! - [`BoothSocket`] is the booth side of the protocol, and [`Simulation`] drives a fleet of
//!   booths against a plaza.

mod booth;
mod plaza;
pub mod sink;

pub use booth::*;
pub use plaza::*;
pub use sink::{EventSink, JsonlSink, MemorySink, SinkError, Sinks, TracingSink};

/// Default size for internal queues.
const DEFAULT_QUEUE_SIZE: usize = 1024;
