//! Deterministic, length-prefixed transcript hashing.
//!
//! Used to bind both parties' public keys into the session-key salt so the
//! same key pair in swapped roles never yields the same keys.

use bytes::{BufMut, BytesMut};
use sha2::{Digest, Sha256};

/// Tags for transcript fields.
pub mod tags {
    pub const DOMAIN: u32 = 0;
    pub const CLIENT_KEY: u32 = 1;
    pub const SERVER_KEY: u32 = 2;
}

/// We append (tag, len, bytes) tuples so the same logical data hashes the same everywhere.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    buf: BytesMut,
}

impl Transcript {
    pub fn new(domain: &'static str) -> Self {
        let mut t = Self { buf: BytesMut::with_capacity(128) };
        t.append_str(tags::DOMAIN, domain);
        t
    }

    pub fn append_bytes(&mut self, tag: u32, data: &[u8]) -> &mut Self {
        self.buf.put_u32(tag);
        self.buf.put_u32(data.len() as u32);
        self.buf.extend_from_slice(data);
        self
    }

    pub fn append_str(&mut self, tag: u32, s: &str) -> &mut Self {
        self.append_bytes(tag, s.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// SHA-256 of the transcript contents.
    pub fn finalize(self) -> [u8; 32] {
        let digest = Sha256::digest(&self.buf);
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&digest);
        hash
    }
}
