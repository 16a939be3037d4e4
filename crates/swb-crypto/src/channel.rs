//! Per-direction AEAD channel used by transport adapters.
//!
//! Each direction has its own key and a 24-byte XChaCha20-Poly1305 nonce
//! seeded by the `Nonce` message. The nonce is incremented as a little-endian
//! integer after every message, so both ends stay in lockstep without sending
//! nonces on the wire.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};

use crate::kx::{SessionKeys, NONCE_LEN};

/// Poly1305 tag length.
pub const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("ciphertext shorter than the authentication tag")]
    TooShort,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
}

pub struct SecureChannel {
    sealer: XChaCha20Poly1305,
    opener: XChaCha20Poly1305,
    tx_nonce: [u8; NONCE_LEN],
    rx_nonce: [u8; NONCE_LEN],
}

impl SecureChannel {
    /// `tx_nonce` seeds outbound messages, `rx_nonce` inbound ones.
    pub fn new(keys: &SessionKeys, tx_nonce: [u8; NONCE_LEN], rx_nonce: [u8; NONCE_LEN]) -> Self {
        Self {
            sealer: XChaCha20Poly1305::new(Key::from_slice(keys.encrypt_key())),
            opener: XChaCha20Poly1305::new(Key::from_slice(keys.decrypt_key())),
            tx_nonce,
            rx_nonce,
        }
    }

    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let ct = self
            .sealer
            .encrypt(XNonce::from_slice(&self.tx_nonce), plaintext)
            .map_err(|_| ChannelError::EncryptionFailed)?;
        increment(&mut self.tx_nonce);
        Ok(ct)
    }

    /// The inbound nonce only advances on success.
    pub fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        if ciphertext.len() < TAG_LEN {
            return Err(ChannelError::TooShort);
        }
        let pt = self
            .opener
            .decrypt(XNonce::from_slice(&self.rx_nonce), ciphertext)
            .map_err(|_| ChannelError::DecryptionFailed)?;
        increment(&mut self.rx_nonce);
        Ok(pt)
    }
}

impl std::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel").finish_non_exhaustive()
    }
}

/// Little-endian increment with carry, wrapping at 2^192.
pub fn increment(nonce: &mut [u8; NONCE_LEN]) {
    for byte in nonce.iter_mut() {
        let (v, carry) = byte.overflowing_add(1);
        *byte = v;
        if !carry {
            return;
        }
    }
}
