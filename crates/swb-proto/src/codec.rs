//! Frame codec: one protobuf [`RtsConnectionV1`] envelope per frame.

use prost::Message;

use crate::rts::RtsMessage;
use crate::v1::RtsConnectionV1;
use crate::validation::ValidationError;

/// Frames shorter than this cannot carry a tagged envelope.
pub const MIN_MESSAGE_SIZE: usize = 2;

#[derive(Debug)]
pub enum DecodeError {
    /// Frame below [`MIN_MESSAGE_SIZE`]
    TooShort(usize),
    /// Protobuf decoding failed
    Malformed(prost::DecodeError),
    /// Envelope carried no message
    Empty,
    /// Message decoded but a field failed validation
    Invalid(ValidationError),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort(len) => {
                write!(f, "frame of {} bytes is below minimum {}", len, MIN_MESSAGE_SIZE)
            }
            Self::Malformed(e) => write!(f, "malformed frame: {}", e),
            Self::Empty => write!(f, "frame carries no message"),
            Self::Invalid(e) => write!(f, "invalid message: {}", e),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Malformed(e) => Some(e),
            Self::Invalid(e) => Some(e),
            _ => None,
        }
    }
}

impl From<prost::DecodeError> for DecodeError {
    fn from(e: prost::DecodeError) -> Self {
        Self::Malformed(e)
    }
}

impl From<ValidationError> for DecodeError {
    fn from(e: ValidationError) -> Self {
        Self::Invalid(e)
    }
}

/// Serialize a message into a frame payload.
pub fn encode(msg: &RtsMessage) -> Vec<u8> {
    RtsConnectionV1::from(msg).encode_to_vec()
}

/// Parse a frame payload.
pub fn decode(frame: &[u8]) -> Result<RtsMessage, DecodeError> {
    if frame.len() < MIN_MESSAGE_SIZE {
        return Err(DecodeError::TooShort(frame.len()));
    }
    let envelope = RtsConnectionV1::decode(frame)?;
    let msg = envelope.msg.ok_or(DecodeError::Empty)?;
    Ok(RtsMessage::try_from(msg)?)
}
