//! Transaction log sinks.
//!
//! The plaza hands every committed entry and exit to an [`EventSink`]. Sinks are
//! fire-and-forget: [`EventSink::record`] never blocks and is never called while the ledger
//! lock is held.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::{mpsc, oneshot},
};
use tracing::{error, info, warn};

use toll_ledger::TollEvent;

use crate::DEFAULT_QUEUE_SIZE;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("Sink closed")]
    Closed,
}

/// Append-only destination for transaction log events.
pub trait EventSink: Send + Sync + 'static {
    fn record(&self, event: TollEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn record(&self, event: TollEvent) {
        (**self).record(event)
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: TollEvent) {
        info!(
            target: "toll::transactions",
            action = ?event.action,
            vehicle_id = %event.vehicle_id,
            entry_point = event.entry_point,
            exit_point = ?event.exit_point,
            toll_fee = ?event.toll_fee,
            travel_time = ?event.travel_time,
            "transaction"
        );
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<TollEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events, oldest first.
    pub fn events(&self) -> Vec<TollEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: TollEvent) {
        self.events.lock().push(event);
    }
}

/// Fans events out to several sinks.
#[derive(Default)]
pub struct Sinks {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Sinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<S: EventSink>(mut self, sink: S) -> Self {
        self.push(sink);
        self
    }

    pub fn push<S: EventSink>(&mut self, sink: S) {
        self.sinks.push(Arc::new(sink));
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for Sinks {
    fn record(&self, event: TollEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.record(event.clone());
            }
            last.record(event);
        }
    }
}

enum Command {
    Record(TollEvent),
    Flush(oneshot::Sender<()>),
}

/// Appends events as JSON lines to a file.
///
/// Events are queued to a background writer task. If the queue is full the event is dropped
/// and counted, so a slow disk never stalls a booth session.
pub struct JsonlSink {
    path: PathBuf,
    tx: mpsc::Sender<Command>,
    dropped: AtomicUsize,
}

impl JsonlSink {
    /// Opens (or creates) `path` for appending and spawns the writer task. Must be called
    /// from within a Tokio runtime.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;

        let (tx, rx) = mpsc::channel(DEFAULT_QUEUE_SIZE);
        tokio::spawn(write_events(file, rx, path.clone()));

        Ok(Self { path, tx, dropped: AtomicUsize::new(0) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of events dropped because the writer couldn't keep up.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Waits until every event recorded so far has been written and flushed.
    pub async fn flush(&self) -> Result<(), SinkError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(Command::Flush(tx)).await.map_err(|_| SinkError::Closed)?;
        rx.await.map_err(|_| SinkError::Closed)
    }
}

impl EventSink for JsonlSink {
    fn record(&self, event: TollEvent) {
        if let Err(e) = self.tx.try_send(Command::Record(event)) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(path = ?self.path, dropped, "transaction log event dropped: {e}");
        }
    }
}

async fn write_events(file: File, mut rx: mpsc::Receiver<Command>, path: PathBuf) {
    let mut writer = BufWriter::new(file);

    while let Some(command) = rx.recv().await {
        let mut waiters = Vec::new();
        let mut next = Some(command);

        // Drain whatever is queued before flushing once.
        while let Some(command) = next {
            match command {
                Command::Record(event) => match serde_json::to_vec(&event) {
                    Ok(mut line) => {
                        line.push(b'\n');
                        if let Err(e) = writer.write_all(&line).await {
                            error!(?path, "failed to write transaction log: {:?}", e);
                            return;
                        }
                    }
                    Err(e) => warn!("failed to serialize event: {:?}", e),
                },
                Command::Flush(waiter) => waiters.push(waiter),
            }

            next = rx.try_recv().ok();
        }

        if let Err(e) = writer.flush().await {
            error!(?path, "failed to flush transaction log: {:?}", e);
            return;
        }

        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}
