//! Wire formats for the toll plaza protocol.
//!
//! Every message is a JSON object. Booths open with a [`Registration`], then send a stream
//! of [`Request`]s, each answered by exactly one [`Response`].

pub mod codec;
pub mod message;

pub use codec::{BoothCodec, Codec, Error, Frame, RegistrationCodec, SessionCodec};
pub use message::{Outcome, Registration, Request, Response};
