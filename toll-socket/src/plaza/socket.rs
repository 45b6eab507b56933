use std::{net::SocketAddr, sync::Arc};

use tokio::{
    net::{lookup_host, TcpListener, ToSocketAddrs},
    sync::oneshot,
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, error, warn};

use toll_ledger::{Ledger, LedgerOptions, RandomSource, StdRandom};

use crate::{
    plaza::{driver::PlazaDriver, reporter::StatsReporter, PlazaError, PlazaOptions, SocketState},
    sink::{EventSink, TracingSink},
    PlazaStats,
};

/// The toll plaza coordination server.
///
/// Accepts booth connections, runs the registration handshake and serves every registered
/// booth from its own session task. All sessions share one [`Ledger`].
pub struct PlazaSocket<R: RandomSource = StdRandom> {
    /// The plaza options, shared with the driver.
    options: Arc<PlazaOptions>,
    /// The plaza state, shared with the driver and sessions.
    state: Arc<SocketState>,
    /// The shared vehicle ledger.
    ledger: Arc<Ledger<R>>,
    /// Transaction log sink. Moved into the driver once the socket is bound.
    sink: Arc<dyn EventSink>,
    /// The local address this socket is bound to.
    local_addr: Option<SocketAddr>,

    /// Internal task representing a running [`PlazaDriver`].
    driver_task: Option<JoinHandle<Result<(), PlazaError>>>,
    /// Tells the driver to stop. Dropping it has the same effect.
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Internal task printing periodic statistics.
    reporter_task: Option<JoinHandle<()>>,
}

impl PlazaSocket<StdRandom> {
    /// Creates a new plaza with a fresh ledger and the default [`PlazaOptions`].
    pub fn new(ledger_options: LedgerOptions) -> Self {
        Self::with_options(Ledger::new(ledger_options), PlazaOptions::default())
    }
}

impl<R: RandomSource> PlazaSocket<R> {
    /// Creates a new plaza around an existing ledger.
    pub fn with_options(ledger: Ledger<R>, options: PlazaOptions) -> Self {
        Self {
            options: Arc::new(options),
            state: Arc::new(SocketState::default()),
            ledger: Arc::new(ledger),
            sink: Arc::new(TracingSink),
            local_addr: None,
            driver_task: None,
            shutdown_tx: None,
            reporter_task: None,
        }
    }

    /// Sets the transaction log sink. Defaults to [`TracingSink`].
    pub fn with_sink<S: EventSink>(mut self, sink: S) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Binds the socket to the given address. This spawns the driver task, and the
    /// statistics reporter if enabled.
    pub async fn bind(&mut self, addr: impl ToSocketAddrs) -> Result<(), PlazaError> {
        let addrs = lookup_host(addr).await?;
        self.try_bind(addrs.collect()).await
    }

    /// Binds to the first address in `addresses` that accepts the bind.
    pub async fn try_bind(&mut self, addresses: Vec<SocketAddr>) -> Result<(), PlazaError> {
        let mut listener = None;

        for addr in addresses {
            match TcpListener::bind(addr).await {
                Ok(l) => {
                    listener = Some(l);
                    break;
                }
                Err(e) => {
                    warn!(?e, ?addr, "failed to bind");
                    continue;
                }
            }
        }

        let Some(listener) = listener else {
            return Err(PlazaError::NoValidEndpoints);
        };
        let local_addr = listener.local_addr()?;

        let span = tracing::info_span!(parent: None, "plaza_driver", ?local_addr);

        span.in_scope(|| {
            debug!(points = self.ledger.network().points(), "listening");
        });

        let (shutdown_tx, shutdown) = oneshot::channel();

        let driver = PlazaDriver {
            listener,
            options: Arc::clone(&self.options),
            state: Arc::clone(&self.state),
            ledger: Arc::clone(&self.ledger),
            sink: Arc::clone(&self.sink),
            sessions: JoinSet::new(),
            next_session_id: 0,
            shutdown,
            draining: false,
            span,
        };

        self.driver_task = Some(tokio::spawn(driver));
        self.shutdown_tx = Some(shutdown_tx);

        if let Some(interval) = self.options.stats_interval {
            let reporter =
                StatsReporter::new(Arc::clone(&self.ledger), Arc::clone(&self.state), interval);
            self.reporter_task = Some(tokio::spawn(reporter.run()));
        }

        self.local_addr = Some(local_addr);

        Ok(())
    }

    /// Returns the local address this socket is bound to. `None` if the socket is not bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Returns the shared ledger.
    pub fn ledger(&self) -> &Arc<Ledger<R>> {
        &self.ledger
    }

    /// Returns the statistics for this socket.
    pub fn stats(&self) -> &PlazaStats {
        &self.state.stats
    }

    /// Stops accepting connections and aborts every booth session, then waits until all of
    /// them have torn down. Once this returns, the vehicles of every entry booth have been
    /// force-exited and their events handed to the sink.
    pub async fn shutdown(&mut self) {
        if let Some(task) = self.reporter_task.take() {
            task.abort();
        }

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.driver_task.take() {
            match task.await {
                Ok(Ok(())) => debug!("plaza driver stopped"),
                Ok(Err(e)) => warn!("plaza driver failed: {:?}", e),
                Err(e) if e.is_panic() => error!("plaza driver panicked: {:?}", e),
                Err(_) => {}
            }
        }
    }
}

impl<R: RandomSource> Drop for PlazaSocket<R> {
    /// Stops the plaza without waiting. Sessions still tear down in the background.
    fn drop(&mut self) {
        if let Some(task) = self.reporter_task.take() {
            task.abort();
        }
        // Dropping the sender stops the driver.
        self.shutdown_tx.take();
    }
}
