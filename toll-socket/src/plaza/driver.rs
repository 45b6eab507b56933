use std::{
    future::Future,
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::JoinSet,
};
use tracing::{debug, error, Instrument};

use toll_ledger::{Ledger, RandomSource};

use crate::{
    plaza::{registrar, PlazaError, PlazaOptions, SocketState},
    sink::EventSink,
};

/// Accepts booth connections and spawns a task per connection, which performs the
/// registration handshake and then runs the booth session.
pub(crate) struct PlazaDriver<R: RandomSource> {
    /// The listener accepting booth connections.
    pub(crate) listener: TcpListener,
    /// Options shared with the socket.
    pub(crate) options: Arc<PlazaOptions>,
    /// The plaza state, shared with the socket front-end.
    pub(crate) state: Arc<SocketState>,
    /// The shared vehicle ledger.
    pub(crate) ledger: Arc<Ledger<R>>,
    /// Transaction log sink.
    pub(crate) sink: Arc<dyn EventSink>,
    /// One task per connection. Dropping the driver aborts them all.
    pub(crate) sessions: JoinSet<()>,
    pub(crate) next_session_id: u64,
    /// Resolves when the socket asks the driver to stop, or is dropped.
    pub(crate) shutdown: oneshot::Receiver<()>,
    /// Set once shutdown started. The driver then only waits for aborted sessions.
    pub(crate) draining: bool,
    pub(crate) span: tracing::Span,
}

impl<R: RandomSource> Future for PlazaDriver<R> {
    type Output = Result<(), PlazaError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if !this.draining && Pin::new(&mut this.shutdown).poll(cx).is_ready() {
            this.draining = true;
            this.span.in_scope(|| debug!(sessions = this.sessions.len(), "shutting down"));
            this.sessions.abort_all();
        }

        loop {
            match this.sessions.poll_join_next(cx) {
                Poll::Ready(Some(result)) => {
                    if let Err(e) = result {
                        if e.is_panic() {
                            this.span.in_scope(|| error!("booth session panicked: {:?}", e));
                        }
                    }

                    continue;
                }
                // Every aborted session has been dropped, and so has run its teardown.
                Poll::Ready(None) if this.draining => return Poll::Ready(Ok(())),
                Poll::Pending if this.draining => return Poll::Pending,
                _ => {}
            }

            match this.listener.poll_accept(cx) {
                Poll::Ready(Ok((io, addr))) => {
                    this.on_incoming(io, addr);
                    continue;
                }
                Poll::Ready(Err(e)) => {
                    this.span.in_scope(|| error!("error accepting incoming connection: {:?}", e));
                    continue;
                }
                Poll::Pending => {}
            }

            return Poll::Pending;
        }
    }
}

impl<R: RandomSource> PlazaDriver<R> {
    fn on_incoming(&mut self, io: TcpStream, addr: SocketAddr) {
        let session_id = self.next_session_id;
        self.next_session_id += 1;

        if self.options.set_nodelay {
            if let Err(e) = io.set_nodelay(true) {
                self.span.in_scope(|| debug!(%addr, "failed to set TCP_NODELAY: {:?}", e));
            }
        }

        let span = tracing::info_span!(parent: &self.span, "connection", session_id, %addr);
        span.in_scope(|| debug!("new connection"));

        let connection = registrar::Connection {
            io,
            addr,
            session_id,
            options: Arc::clone(&self.options),
            state: Arc::clone(&self.state),
            ledger: Arc::clone(&self.ledger),
            sink: Arc::clone(&self.sink),
        };

        self.sessions.spawn(connection.serve().instrument(span));
    }
}
