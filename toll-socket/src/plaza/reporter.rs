use std::{sync::Arc, time::Duration};

use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use toll_ledger::{Ledger, LedgerStats, RandomSource};

use crate::plaza::{PlazaStats, SocketState};

/// Periodically prints a human readable summary of the ledger and the plaza.
pub(crate) struct StatsReporter<R: RandomSource> {
    ledger: Arc<Ledger<R>>,
    state: Arc<SocketState>,
    interval: Duration,
}

impl<R: RandomSource> StatsReporter<R> {
    pub(crate) fn new(ledger: Arc<Ledger<R>>, state: Arc<SocketState>, interval: Duration) -> Self {
        Self { ledger, state, interval }
    }

    pub(crate) async fn run(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            info!(target: "toll::stats", "{}", summary(&self.ledger.stats(), &self.state.stats));
        }
    }
}

/// Renders ledger and plaza statistics as a single line.
pub fn summary(ledger: &LedgerStats, plaza: &PlazaStats) -> String {
    format!(
        "Vehicles on highway: {}, Completed: {}, Total vehicles: {}, Total toll collected: ${:.2}, \
         Booths: {} entry / {} exit, Requests: {} ({} failed), Forced exits: {}",
        ledger.on_highway,
        ledger.completed,
        ledger.total_vehicles_entered,
        ledger.total_fees_collected,
        ledger.connected_entry_booths,
        ledger.connected_exit_booths,
        plaza.requests(),
        plaza.failed_requests(),
        plaza.forced_exits(),
    )
}
