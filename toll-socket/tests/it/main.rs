mod booth;
mod plaza;

use std::time::Duration;

use toll_ledger::{Ledger, LedgerOptions, TravelTimeModel};
use toll_socket::{MemorySink, PlazaOptions, PlazaSocket};

/// Per-unit travel delay used by the tests, so journeys take milliseconds.
const BASE_DELAY: Duration = Duration::from_millis(20);

fn ledger_options() -> LedgerOptions {
    LedgerOptions::default().travel(TravelTimeModel::default().with_base_delay(BASE_DELAY))
}

/// Binds a plaza on a random local port, recording its transactions into `sink`.
async fn plaza(options: LedgerOptions, sink: MemorySink) -> PlazaSocket {
    let _ = tracing_subscriber::fmt::try_init();

    let mut plaza = PlazaSocket::with_options(
        Ledger::new(options),
        PlazaOptions::default().stats_interval(Duration::ZERO),
    )
    .with_sink(sink);

    plaza.bind("127.0.0.1:0").await.unwrap();
    plaza
}

/// Polls `condition` until it holds, panicking after a second.
async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
