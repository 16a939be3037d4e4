//! Key exchange primitives.
//!
//! The device holds one long-term X25519 key pair. Session keys for a peer
//! are derived from the X25519 shared secret mixed with the PIN shown on the
//! device, so an observer of the link cannot complete the derivation without
//! the out-of-band PIN:
//!
//! ```text
//! salt = SHA-256(transcript(client_pub, server_pub))
//! prk  = HKDF-Extract(salt, DH(secret, peer_pub) || pin)
//! server_tx = HKDF-Expand(prk, "swb_rts_server_tx_key_v1")
//! server_rx = HKDF-Expand(prk, "swb_rts_server_rx_key_v1")
//! ```
//!
//! The client derives the same two keys with the directions swapped.

use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::transcript::{tags, Transcript};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;
pub const DEFAULT_PIN_DIGITS: usize = 6;
/// Longest numeric secret [`generate_pin`] produces.
pub const MAX_PIN_DIGITS: usize = 16;

const SESSION_KEYS_DOMAIN: &str = "swb_rts_session_keys_v1";
const SERVER_TX_LABEL: &[u8] = b"swb_rts_server_tx_key_v1";
const SERVER_RX_LABEL: &[u8] = b"swb_rts_server_rx_key_v1";

#[derive(Debug, thiserror::Error)]
pub enum KexError {
    #[error("system RNG unavailable")]
    RngUnavailable,
    #[error("peer public key yields a non-contributory shared secret")]
    NonContributory,
    #[error("PIN length must be 1..={max} digits, got {actual}")]
    InvalidPinLength { max: usize, actual: usize },
    #[error("session key expansion failed")]
    Derivation,
}

/// Fill `buf` from the OS CSPRNG.
pub fn fill_random(buf: &mut [u8]) -> Result<(), KexError> {
    getrandom::getrandom(buf).map_err(|_| KexError::RngUnavailable)
}

/// Which end of the link is deriving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// The device.
    Server,
    /// The companion app.
    Client,
}

/// Symmetric keys for one peer, named from the deriving side's perspective.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    encrypt: [u8; KEY_LEN],
    decrypt: [u8; KEY_LEN],
}

impl SessionKeys {
    pub fn new(encrypt: [u8; KEY_LEN], decrypt: [u8; KEY_LEN]) -> Self {
        Self { encrypt, decrypt }
    }

    pub fn encrypt_key(&self) -> &[u8; KEY_LEN] {
        &self.encrypt
    }

    pub fn decrypt_key(&self) -> &[u8; KEY_LEN] {
        &self.decrypt
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKeys(<redacted>)")
    }
}

/// The device's long-term X25519 key pair.
#[derive(Clone)]
pub struct LongTermKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl LongTermKeyPair {
    pub fn generate() -> Result<Self, KexError> {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        fill_random(&mut bytes[..])?;
        Ok(Self::from_secret_bytes(*bytes))
    }

    pub fn from_secret_bytes(bytes: [u8; KEY_LEN]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_bytes(&self) -> [u8; KEY_LEN] {
        self.public.to_bytes()
    }

    /// Secret half, for persistence only.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; KEY_LEN]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// Derive the session keys shared with `peer_public`.
    ///
    /// Deterministic for identical inputs. An empty `pin` is allowed for
    /// callers that mix no PIN; the pairing protocol always supplies one on
    /// first pairing.
    pub fn derive_session_keys(
        &self,
        role: Role,
        peer_public: &[u8; KEY_LEN],
        pin: &str,
    ) -> Result<SessionKeys, KexError> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(*peer_public));
        if !shared.was_contributory() {
            return Err(KexError::NonContributory);
        }

        let own = self.public_bytes();
        let (client_pub, server_pub) = match role {
            Role::Server => (peer_public, &own),
            Role::Client => (&own, peer_public),
        };
        let mut transcript = Transcript::new(SESSION_KEYS_DOMAIN);
        transcript
            .append_bytes(tags::CLIENT_KEY, client_pub)
            .append_bytes(tags::SERVER_KEY, server_pub);
        let salt = transcript.finalize();

        let mut ikm = Zeroizing::new(Vec::with_capacity(KEY_LEN + pin.len()));
        ikm.extend_from_slice(shared.as_bytes());
        ikm.extend_from_slice(pin.as_bytes());

        let hk = Hkdf::<Sha256>::new(Some(&salt[..]), &ikm);
        let mut server_tx = Zeroizing::new([0u8; KEY_LEN]);
        let mut server_rx = Zeroizing::new([0u8; KEY_LEN]);
        hk.expand(SERVER_TX_LABEL, &mut server_tx[..])
            .map_err(|_| KexError::Derivation)?;
        hk.expand(SERVER_RX_LABEL, &mut server_rx[..])
            .map_err(|_| KexError::Derivation)?;

        Ok(match role {
            Role::Server => SessionKeys::new(*server_tx, *server_rx),
            Role::Client => SessionKeys::new(*server_rx, *server_tx),
        })
    }
}

impl std::fmt::Debug for LongTermKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LongTermKeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

/// Uniformly random decimal string of `digits` characters.
pub fn generate_pin(digits: usize) -> Result<String, KexError> {
    if digits == 0 || digits > MAX_PIN_DIGITS {
        return Err(KexError::InvalidPinLength { max: MAX_PIN_DIGITS, actual: digits });
    }
    let mut pin = String::with_capacity(digits);
    let mut pool = Zeroizing::new([0u8; 32]);
    while pin.len() < digits {
        fill_random(&mut pool[..])?;
        // 250 is the largest multiple of 10 below 256; higher bytes would bias 0..=5.
        for &b in pool.iter().filter(|&&b| b < 250) {
            if pin.len() == digits {
                break;
            }
            pin.push(char::from(b'0' + b % 10));
        }
    }
    Ok(pin)
}

pub fn generate_nonce() -> Result<[u8; NONCE_LEN], KexError> {
    let mut nonce = [0u8; NONCE_LEN];
    fill_random(&mut nonce)?;
    Ok(nonce)
}

pub fn random_u32() -> Result<u32, KexError> {
    let mut b = [0u8; 4];
    fill_random(&mut b)?;
    Ok(u32::from_le_bytes(b))
}
