//! Wire format for the switchboard pairing protocol.
//!
//! - [`v1`]: protobuf message definitions exchanged with the client app
//! - [`rts`]: the domain tagged union handed to the pairing state machine
//! - [`codec`]: bytes <-> [`rts::RtsMessage`] at the serialization boundary

#![forbid(unsafe_code)]

pub mod v1;
pub mod rts;
pub mod codec;
pub mod conversions;
pub mod validation;

#[cfg(test)]
mod proptests;

pub use codec::{decode, encode, DecodeError, MIN_MESSAGE_SIZE};
pub use rts::{CommsType, MessageTag, RtsMessage};
