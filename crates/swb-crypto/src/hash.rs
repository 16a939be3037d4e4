use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    let out = h.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out);
    arr
}

/// Short printable identifier for a public key, for logs.
pub fn key_fingerprint(pubkey_bytes: &[u8]) -> String {
    hex::encode(&sha256(pubkey_bytes)[..8])
}

/// Constant-time comparison for key material.
pub fn keys_equal(a: &[u8], b: &[u8]) -> bool {
    constant_time_eq::constant_time_eq(a, b)
}
