//! Transport adapter boundary.
//!
//! The adapter owns framing and the AEAD channel. The state machine only
//! configures it and exchanges decoded payloads through it.

use swb_crypto::SessionKeys;
use swb_proto::rts::NonceBytes;

use crate::errors::TransportError;

/// What the link delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    PlaintextReceived(Vec<u8>),
    /// Payload already authenticated and decrypted.
    EncryptedReceived(Vec<u8>),
    /// AEAD tag mismatch; the payload is withheld.
    DecryptionFailed,
}

pub trait RtsTransport {
    fn set_crypto_keys(&mut self, keys: &SessionKeys);

    /// `to_robot` seeds inbound decryption, `to_device` outbound encryption.
    fn set_nonce(&mut self, to_robot: &NonceBytes, to_device: &NonceBytes);

    fn set_encrypted_channel_established(&mut self, established: bool);

    fn send_plaintext(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    fn send_encrypted(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Classify a raw inbound frame, opening it if the encrypted channel is
    /// up. Adapters that decrypt elsewhere keep the default.
    fn open_frame(&mut self, frame: Vec<u8>) -> LinkEvent {
        LinkEvent::PlaintextReceived(frame)
    }
}
