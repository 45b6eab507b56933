use std::{net::SocketAddr, sync::Arc, time::Instant};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

use toll_ledger::{
    BoothHandle, BoothKey, Direction, EntryError, ExitError, Ledger, RandomSource, TollEvent,
};
use toll_wire::{Frame, Outcome, Request, Response, SessionCodec};

use crate::{
    plaza::{PlazaError, SocketState},
    sink::EventSink,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Registering,
    Active,
    Closing,
}

/// Serves one registered booth: one response per request, in request order.
///
/// Teardown runs when the session is dropped, so it also happens if the session task is
/// aborted or panics. Only a session that became active tears down.
pub(crate) struct BoothSession<R: RandomSource> {
    key: BoothKey,
    session_id: u64,
    peer: SocketAddr,
    status: Status,
    state: Arc<SocketState>,
    ledger: Arc<Ledger<R>>,
    sink: Arc<dyn EventSink>,
    span: tracing::Span,
}

impl<R: RandomSource> BoothSession<R> {
    pub(crate) fn new(
        key: BoothKey,
        session_id: u64,
        peer: SocketAddr,
        state: Arc<SocketState>,
        ledger: Arc<Ledger<R>>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let span = tracing::info_span!("booth_session", %key);

        Self { key, session_id, peer, status: Status::Registering, state, ledger, sink, span }
    }

    pub(crate) async fn run<T>(mut self, mut conn: Framed<T, SessionCodec>)
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        if let Err(e) = self.activate(&mut conn).await {
            let _enter = self.span.enter();
            debug!("session not started: {}", e);
            return;
        }

        loop {
            let frame = match conn.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    let _enter = self.span.enter();
                    warn!("connection failure: {:?}", e);
                    break;
                }
                None => {
                    let _enter = self.span.enter();
                    debug!("booth disconnected");
                    break;
                }
            };

            let response = self.handle(frame);

            if let Err(e) = conn.send(response).await {
                let _enter = self.span.enter();
                warn!("failed to send response: {:?}", e);
                break;
            }
        }
    }

    /// Registers the session under its key and acknowledges the registration. Rejects the
    /// booth if the key is already connected.
    async fn activate<T>(&mut self, conn: &mut Framed<T, SessionCodec>) -> Result<(), PlazaError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let handle = BoothHandle {
            session_id: self.session_id,
            peer: self.peer,
            connected_at: Instant::now(),
        };

        if let Err(conflict) = self.ledger.connect_booth(self.key, handle) {
            self.state.stats.increment_rejected_registrations();

            let message = conflict.to_string();
            conn.send(Response::failure(message.clone())).await?;
            SinkExt::<Response>::close(conn).await?;

            return Err(PlazaError::Rejected(message));
        }

        self.status = Status::Active;
        self.state.stats.increment_registrations();
        self.state.stats.increment_active_sessions();
        self.span.in_scope(|| info!(peer = %self.peer, "booth registered"));

        conn.send(Response::ack()).await?;

        Ok(())
    }

    fn handle(&self, frame: Frame<Request>) -> Response {
        let _enter = self.span.enter();
        self.state.stats.increment_requests();

        match frame {
            Frame::Message(request) => self.dispatch(request),
            Frame::Malformed(reason) => {
                debug!(%reason, "malformed request");
                self.fail(format!("Invalid request: {reason}"))
            }
        }
    }

    fn dispatch(&self, request: Request) -> Response {
        if request.booth_id() != self.key.booth_id || request.point() != self.key.point {
            return self.fail(format!(
                "Request for booth {} at point {} does not match registered {}",
                request.booth_id(),
                request.point(),
                self.key
            ));
        }

        match (request, self.key.direction) {
            (Request::Entry { vehicle_id, .. }, Direction::Entry) => self.on_entry(vehicle_id),
            (Request::Exit { .. }, Direction::Exit) => self.on_exit(),
            (request, direction) => self.fail(format!(
                "{} requests are not accepted at an {direction} booth",
                request.action()
            )),
        }
    }

    fn on_entry(&self, vehicle_id: Option<String>) -> Response {
        let Some(vehicle_id) = vehicle_id else {
            debug!("booth has no vehicles left");
            return Response::Complete;
        };

        match self.ledger.try_enter(&self.key, &vehicle_id, Instant::now()) {
            Ok(receipt) => {
                self.sink.record(TollEvent::from(&receipt));
                debug!(%vehicle_id, "vehicle entered");

                Response::Success(Outcome {
                    vehicle_id: Some(receipt.vehicle_id),
                    entry_point: Some(receipt.entry_point),
                    ..Default::default()
                })
            }
            Err(EntryError::SimulationComplete) => Response::Complete,
            Err(e) => {
                debug!(%vehicle_id, "entry refused: {}", e);
                self.fail(e.to_string())
            }
        }
    }

    fn on_exit(&self) -> Response {
        match self.ledger.try_exit(&self.key, Instant::now()) {
            Ok(receipt) => {
                self.sink.record(TollEvent::from(&receipt));
                debug!(
                    vehicle_id = %receipt.vehicle_id,
                    toll_fee = receipt.toll_fee,
                    "vehicle exited"
                );

                Response::Success(Outcome {
                    vehicle_id: Some(receipt.vehicle_id),
                    entry_point: Some(receipt.entry_point),
                    exit_point: Some(receipt.exit_point),
                    toll_fee: Some(receipt.toll_fee),
                    travel_time: Some(receipt.travel_time),
                })
            }
            Err(ExitError::SimulationComplete) => Response::Complete,
            Err(e @ ExitError::NoEligibleVehicle(_)) => {
                trace!("nothing to release");
                Response::failure(e.to_string())
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    fn fail(&self, message: String) -> Response {
        self.state.stats.increment_failed_requests();
        Response::failure(message)
    }

    /// Removes the session from the connected booths and, for entry booths, force-exits every
    /// vehicle it admitted that is still on the highway. Both happen under one ledger lock, so
    /// a booth reconnecting under the same key never loses its vehicles to this teardown.
    fn teardown(&mut self) {
        if self.status != Status::Active {
            return;
        }
        self.status = Status::Closing;

        let _enter = self.span.enter();

        let receipts = self.ledger.close_booth(&self.key, self.session_id, Instant::now());
        self.state.stats.decrement_active_sessions();

        if !receipts.is_empty() {
            let fees: f64 = receipts.iter().map(|r| r.toll_fee).sum();
            warn!(vehicles = receipts.len(), fees, "forced exit of vehicles left by booth");

            self.state.stats.add_forced_exits(receipts.len());
            for receipt in &receipts {
                self.sink.record(TollEvent::from(receipt));
            }
        }

        info!("booth session closed");
    }
}

impl<R: RandomSource> Drop for BoothSession<R> {
    fn drop(&mut self) {
        self.teardown();
    }
}
