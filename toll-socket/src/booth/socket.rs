use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::{lookup_host, TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;
use tracing::debug;

use toll_ledger::{BoothKey, Direction};
use toll_wire::{BoothCodec, Frame, Registration, Request, Response};

use crate::booth::{BoothError, BoothOptions};

/// The booth side of the plaza protocol: one registered connection, one request in flight.
pub struct BoothSocket {
    conn: Framed<TcpStream, BoothCodec>,
    registration: Registration,
    options: BoothOptions,
    peer: SocketAddr,
}

impl BoothSocket {
    /// Connects to a plaza and registers with the default [`BoothOptions`].
    pub async fn connect(
        addr: impl ToSocketAddrs,
        registration: Registration,
    ) -> Result<Self, BoothError> {
        Self::connect_with_options(addr, registration, BoothOptions::default()).await
    }

    /// Connects to a plaza and registers. Fails with [`BoothError::Rejected`] if the plaza
    /// refuses the registration.
    pub async fn connect_with_options(
        addr: impl ToSocketAddrs,
        registration: Registration,
        options: BoothOptions,
    ) -> Result<Self, BoothError> {
        let mut last_err = None;
        let mut stream = None;

        for addr in lookup_host(addr).await? {
            match TcpStream::connect(addr).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }

        let stream = match (stream, last_err) {
            (Some(stream), _) => stream,
            (None, Some(e)) => return Err(e.into()),
            (None, None) => return Err(BoothError::SocketClosed),
        };

        stream.set_nodelay(options.set_nodelay)?;
        let peer = stream.peer_addr()?;

        let mut socket =
            Self { conn: Framed::new(stream, BoothCodec::new()), registration, options, peer };

        match socket.exchange(registration).await? {
            Response::Success(_) => {
                debug!(?registration, %peer, "registered");
                Ok(socket)
            }
            Response::Failure { message } => Err(BoothError::Rejected(message)),
            Response::Complete => Err(BoothError::Rejected("simulation complete".to_string())),
        }
    }

    /// Sends a request and waits for its response.
    pub async fn request(&mut self, request: Request) -> Result<Response, BoothError> {
        self.exchange(request).await
    }

    /// Reports a vehicle entry. `None` tells the plaza this booth has nothing left to admit.
    pub async fn enter(&mut self, vehicle_id: Option<&str>) -> Result<Response, BoothError> {
        let request = Request::Entry {
            booth_id: self.registration.booth_id,
            point: self.registration.point,
            vehicle_id: vehicle_id.map(str::to_string),
        };

        self.exchange(request).await
    }

    /// Asks the plaza to release a vehicle at this booth.
    pub async fn exit(&mut self) -> Result<Response, BoothError> {
        let request =
            Request::Exit { booth_id: self.registration.booth_id, point: self.registration.point };

        self.exchange(request).await
    }

    pub fn registration(&self) -> Registration {
        self.registration
    }

    pub fn key(&self) -> BoothKey {
        BoothKey::new(
            self.registration.point,
            self.registration.booth_id,
            Direction::from_is_entry(self.registration.is_entry),
        )
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Closes the connection.
    pub async fn close(mut self) -> Result<(), BoothError> {
        SinkExt::<Request>::close(&mut self.conn).await?;
        Ok(())
    }

    async fn exchange<M: serde::Serialize>(&mut self, message: M) -> Result<Response, BoothError> {
        self.conn.send(message).await?;

        let next = tokio::time::timeout(self.options.timeout, self.conn.next())
            .await
            .map_err(|_| BoothError::Timeout)?;

        match next.ok_or(BoothError::SocketClosed)?? {
            Frame::Message(response) => Ok(response),
            Frame::Malformed(reason) => Err(BoothError::Malformed(reason)),
        }
    }
}
