//! Device identity and the key exchange component.

use tracing::{info, warn};

use swb_crypto::hash::key_fingerprint;
use swb_crypto::kx::fill_random;
use swb_crypto::{KexError, LongTermKeyPair, Role, SessionKeys};
use swb_proto::rts::{NonceBytes, PublicKeyBytes};

use crate::store::{KeyStorage, StoredIdentity};

/// Characters used for the random device-name suffix.
const NAME_ALPHABET: &[u8; 32] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
const NAME_SUFFIX_LEN: usize = 4;

/// Owns the long-term key pair and the device name.
pub struct KeyExchange {
    keypair: LongTermKeyPair,
    device_name: String,
}

impl KeyExchange {
    pub fn new(keypair: LongTermKeyPair, device_name: impl Into<String>) -> Self {
        Self { keypair, device_name: device_name.into() }
    }

    /// Load the persisted identity, or generate and christen a new one.
    ///
    /// Idempotent: once an identity is stored every call returns it. A failed
    /// save is logged and the fresh identity is still used for this run.
    pub fn load_or_generate(
        storage: &mut dyn KeyStorage,
        name_prefix: &str,
    ) -> Result<Self, KexError> {
        match storage.load_identity() {
            Ok(Some(identity)) => {
                let keypair = LongTermKeyPair::from_secret_bytes(identity.secret_key);
                info!(
                    device = %identity.device_name,
                    key = %key_fingerprint(&keypair.public_bytes()),
                    "loaded device identity"
                );
                return Ok(Self::new(keypair, identity.device_name.clone()));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "stored identity unreadable, generating a new one"),
        }

        let keypair = LongTermKeyPair::generate()?;
        let device_name = christen(name_prefix)?;
        let identity = StoredIdentity {
            secret_key: *keypair.secret_bytes(),
            device_name: device_name.clone(),
        };
        if let Err(e) = storage.save_identity(&identity) {
            warn!(error = %e, "could not persist device identity");
        }
        info!(
            device = %device_name,
            key = %key_fingerprint(&keypair.public_bytes()),
            "generated device identity"
        );
        Ok(Self::new(keypair, device_name))
    }

    pub fn public_key(&self) -> PublicKeyBytes {
        self.keypair.public_bytes()
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// First-pairing derivation: mixes the peer key and the displayed PIN.
    pub fn derive_server_session_keys(
        &self,
        peer_public: &PublicKeyBytes,
        pin: &str,
    ) -> Result<SessionKeys, KexError> {
        self.keypair.derive_session_keys(Role::Server, peer_public, pin)
    }

    pub fn generate_pin(&self, digits: usize) -> Result<String, KexError> {
        swb_crypto::generate_pin(digits)
    }

    pub fn generate_nonce(&self) -> Result<NonceBytes, KexError> {
        swb_crypto::generate_nonce()
    }

    pub fn random_u32(&self) -> Result<u32, KexError> {
        swb_crypto::random_u32()
    }
}

/// `<prefix>-XXXX` with a random suffix.
pub fn christen(prefix: &str) -> Result<String, KexError> {
    let mut raw = [0u8; NAME_SUFFIX_LEN];
    fill_random(&mut raw)?;
    let suffix: String = raw
        .iter()
        .map(|b| char::from(NAME_ALPHABET[(*b as usize) % NAME_ALPHABET.len()]))
        .collect();
    Ok(format!("{}-{}", prefix, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKeyStorage;

    #[test]
    fn test_identity_is_generated_once() {
        let mut storage = MemoryKeyStorage::new();
        let first = KeyExchange::load_or_generate(&mut storage, "Vector").unwrap();
        let second = KeyExchange::load_or_generate(&mut storage, "Vector").unwrap();
        assert_eq!(first.public_key(), second.public_key());
        assert_eq!(first.device_name(), second.device_name());
        assert_eq!(storage.save_count(), 1);
    }

    #[test]
    fn test_identity_survives_failed_save() {
        let mut storage = MemoryKeyStorage::new();
        storage.set_fail_saves(true);
        let kex = KeyExchange::load_or_generate(&mut storage, "Vector").unwrap();
        assert!(kex.device_name().starts_with("Vector-"));
    }

    #[test]
    fn test_christened_name_shape() {
        let name = christen("Vector").unwrap();
        let (prefix, suffix) = name.split_once('-').unwrap();
        assert_eq!(prefix, "Vector");
        assert_eq!(suffix.len(), NAME_SUFFIX_LEN);
        assert!(suffix.bytes().all(|b| NAME_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_server_keys_match_client_derivation() {
        let kex = KeyExchange::new(LongTermKeyPair::generate().unwrap(), "Vector-TEST");
        let app = LongTermKeyPair::generate().unwrap();
        let server = kex.derive_server_session_keys(&app.public_bytes(), "246810").unwrap();
        let client = app.derive_session_keys(Role::Client, &kex.public_key(), "246810").unwrap();
        assert_eq!(server.encrypt_key(), client.decrypt_key());
    }
}
