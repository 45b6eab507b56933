use std::marker::PhantomData;

use bytes::{Buf, BufMut, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use toll_common::constants::KiB;

use crate::message::{Registration, Request, Response};

/// Default upper bound for a single frame that hasn't been completed yet.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * KiB as usize;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Frame exceeds maximum length ({0} bytes buffered)")]
    FrameTooLarge(usize),
}

/// A decoded frame. Malformed frames are surfaced as values instead of errors, so that a
/// bad message doesn't tear down the connection it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame<T> {
    Message(T),
    Malformed(String),
}

/// JSON codec. Decodes values of type `D` one complete JSON value at a time, which accepts
/// both newline-delimited frames and objects written back to back. Encodes any
/// [`Serialize`] value as a single line.
pub struct Codec<D> {
    max_frame_len: usize,
    _marker: PhantomData<fn() -> D>,
}

/// Server side codec for the registration handshake.
pub type RegistrationCodec = Codec<Registration>;
/// Server side codec for an active booth session.
pub type SessionCodec = Codec<Request>;
/// Booth side codec. Booths only ever read responses.
pub type BoothCodec = Codec<Response>;

impl<D> Codec<D> {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self { max_frame_len, _marker: PhantomData }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Converts this codec into one decoding a different message type, keeping its limits.
    pub fn retype<T>(&self) -> Codec<T> {
        Codec::with_max_frame_len(self.max_frame_len)
    }
}

impl<D> Default for Codec<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> std::fmt::Debug for Codec<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec").field("max_frame_len", &self.max_frame_len).finish()
    }
}

impl<D: DeserializeOwned> Decoder for Codec<D> {
    type Item = Frame<D>;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(start) = src.iter().position(|b| !b.is_ascii_whitespace()) else {
            src.clear();
            return Ok(None);
        };
        src.advance(start);

        let (next, consumed) = {
            let mut values =
                serde_json::Deserializer::from_slice(&src[..]).into_iter::<serde_json::Value>();
            let next = values.next();
            (next, values.byte_offset())
        };

        match next {
            Some(Ok(value)) => {
                src.advance(consumed);

                let frame = match serde_json::from_value(value) {
                    Ok(msg) => Frame::Message(msg),
                    Err(e) => Frame::Malformed(e.to_string()),
                };

                Ok(Some(frame))
            }
            Some(Err(e)) if e.is_eof() => {
                if src.len() > self.max_frame_len {
                    return Err(Error::FrameTooLarge(src.len()));
                }

                tracing::trace!(buffered = src.len(), "incomplete frame");
                Ok(None)
            }
            Some(Err(e)) => {
                // Resynchronize on the next line break, or drop everything buffered.
                let skip =
                    src.iter().position(|b| *b == b'\n').map(|i| i + 1).unwrap_or(src.len());
                src.advance(skip);

                Ok(Some(Frame::Malformed(e.to_string())))
            }
            None => {
                src.clear();
                Ok(None)
            }
        }
    }
}

impl<D, T: Serialize> Encoder<T> for Codec<D> {
    type Error = Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&item)?;

        dst.reserve(payload.len() + 1);
        dst.put_slice(&payload);
        dst.put_u8(b'\n');

        Ok(())
    }
}
