use std::{net::SocketAddr, sync::Arc};

use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_util::codec::Framed;
use tracing::debug;

use toll_ledger::{BoothKey, Direction, Ledger, Network, RandomSource};
use toll_wire::{Frame, Registration, RegistrationCodec, Request, Response};

use crate::{
    plaza::{session::BoothSession, PlazaError, PlazaOptions, SocketState},
    sink::EventSink,
};

/// A freshly accepted connection that hasn't registered yet.
pub(crate) struct Connection<R: RandomSource> {
    pub(crate) io: TcpStream,
    pub(crate) addr: SocketAddr,
    pub(crate) session_id: u64,
    pub(crate) options: Arc<PlazaOptions>,
    pub(crate) state: Arc<SocketState>,
    pub(crate) ledger: Arc<Ledger<R>>,
    pub(crate) sink: Arc<dyn EventSink>,
}

impl<R: RandomSource> Connection<R> {
    /// Runs the registration handshake, then hands the connection to a [`BoothSession`].
    pub(crate) async fn serve(self) {
        let Self { io, addr, session_id, options, state, ledger, sink } = self;

        let mut conn =
            Framed::new(io, RegistrationCodec::with_max_frame_len(options.max_frame_len));

        let key = match handshake(&mut conn, ledger.network()).await {
            Ok(key) => key,
            Err(e) => {
                state.stats.increment_rejected_registrations();
                debug!("registration failed: {}", e);
                return;
            }
        };

        let conn = conn.map_codec(|codec| codec.retype::<Request>());
        BoothSession::new(key, session_id, addr, state, ledger, sink).run(conn).await;
    }
}

/// Reads exactly one registration message and validates it. Invalid registrations are
/// answered with a failure and the connection is closed.
async fn handshake<T>(
    conn: &mut Framed<T, RegistrationCodec>,
    network: &Network,
) -> Result<BoothKey, PlazaError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let frame = conn.next().await.ok_or(PlazaError::SocketClosed)??;

    let registration = match frame {
        Frame::Message(registration) => registration,
        Frame::Malformed(reason) => {
            return reject(conn, format!("Invalid registration: {reason}")).await;
        }
    };

    debug!(?registration, "registration received");

    if let Err(reason) = validate(&registration, network) {
        return reject(conn, reason).await;
    }

    Ok(BoothKey::new(
        registration.point,
        registration.booth_id,
        Direction::from_is_entry(registration.is_entry),
    ))
}

async fn reject<T>(
    conn: &mut Framed<T, RegistrationCodec>,
    message: String,
) -> Result<BoothKey, PlazaError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    conn.send(Response::failure(message.clone())).await?;
    SinkExt::<Response>::close(conn).await?;

    Err(PlazaError::Rejected(message))
}

/// Checks a registration against the network layout.
pub(crate) fn validate(registration: &Registration, network: &Network) -> Result<(), String> {
    let Registration { booth_id, point, .. } = *registration;

    if !network.contains(point) {
        return Err(format!(
            "Invalid entry/exit point {point}, must be between 0 and {}",
            network.last_point()
        ));
    }

    if !network.has_booth(point, booth_id) {
        return Err(format!(
            "Invalid booth {booth_id} at point {point}, must be between 1 and {}",
            network.booths_at(point)
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_against_network() {
        let network = Network::default();

        let registration =
            |booth_id, point, is_entry| Registration { booth_id, point, is_entry };

        assert!(validate(&registration(1, 0, true), &network).is_ok());
        assert!(validate(&registration(6, 17, false), &network).is_ok());

        let err = validate(&Registration { booth_id: 1, point: 18, is_entry: true }, &network)
            .unwrap_err();
        assert!(err.contains("between 0 and 17"));

        assert!(validate(&registration(5, 3, true), &network).is_err());
        assert!(validate(&registration(0, 3, true), &network).is_err());
    }

    #[tokio::test]
    async fn malformed_registration_is_rejected() {
        let (client, server) = tokio::io::duplex(1024);
        let mut server = Framed::new(server, RegistrationCodec::new());
        let mut client = Framed::new(client, toll_wire::BoothCodec::new());

        client
            .send(serde_json::json!({ "booth_id": "one", "point": 0, "is_entry": true }))
            .await
            .unwrap();

        let result = handshake(&mut server, &Network::default()).await;
        assert!(matches!(result, Err(PlazaError::Rejected(_))));

        let response = client.next().await.unwrap().unwrap();
        assert!(matches!(response, Frame::Message(Response::Failure { .. })));
    }

    #[tokio::test]
    async fn valid_registration_yields_key() {
        let (client, server) = tokio::io::duplex(1024);
        let mut server = Framed::new(server, RegistrationCodec::new());
        let mut client = Framed::new(client, toll_wire::BoothCodec::new());

        client.send(Registration { booth_id: 2, point: 5, is_entry: false }).await.unwrap();

        let key = handshake(&mut server, &Network::default()).await.unwrap();
        assert_eq!(key, BoothKey::exit(5, 2));
    }
}
