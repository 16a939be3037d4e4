//! Client key store and its persistence backends.
//!
//! [`ClientKeyStore`] is the in-memory map from peer public key to session
//! keys that the state machine consults. It is backed by a [`KeyStorage`],
//! which also persists the device's own long-term identity:
//!
//! - [`MemoryKeyStorage`]: shared in-memory state for tests and dry runs
//! - [`FileKeyStorage`]: a single versioned JSON key file, replaced atomically
//!
//! A missing, corrupt or wrong-version key file loads as empty state.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use swb_crypto::hash::{key_fingerprint, keys_equal};
use swb_crypto::{SessionKeys, KEY_LEN};
use swb_proto::rts::PublicKeyBytes;

use crate::errors::StoreError;

/// Key file format written by this version.
pub const KEY_FILE_VERSION: u32 = 3;

// ============================================================================
// Data Models
// ============================================================================

/// Session keys stored for one paired client.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ClientRecord {
    pub public_key: PublicKeyBytes,
    /// Device-side encrypt key.
    pub session_tx_key: [u8; KEY_LEN],
    /// Device-side decrypt key.
    pub session_rx_key: [u8; KEY_LEN],
    /// Unix seconds.
    pub paired_at: i64,
}

impl ClientRecord {
    pub fn new(public_key: PublicKeyBytes, keys: &SessionKeys, paired_at: i64) -> Self {
        Self {
            public_key,
            session_tx_key: *keys.encrypt_key(),
            session_rx_key: *keys.decrypt_key(),
            paired_at,
        }
    }

    pub fn session_keys(&self) -> SessionKeys {
        SessionKeys::new(self.session_tx_key, self.session_rx_key)
    }
}

impl std::fmt::Debug for ClientRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRecord")
            .field("client", &key_fingerprint(&self.public_key))
            .field("paired_at", &self.paired_at)
            .finish_non_exhaustive()
    }
}

/// The device's persisted long-term identity.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct StoredIdentity {
    pub secret_key: [u8; KEY_LEN],
    pub device_name: String,
}

impl std::fmt::Debug for StoredIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredIdentity")
            .field("device_name", &self.device_name)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Storage trait
// ============================================================================

/// Durable storage for the identity and the client records.
///
/// Called only from the reactor thread.
pub trait KeyStorage {
    fn load_identity(&self) -> Result<Option<StoredIdentity>, StoreError>;
    fn save_identity(&mut self, identity: &StoredIdentity) -> Result<(), StoreError>;
    fn load_clients(&self) -> Result<Vec<ClientRecord>, StoreError>;
    fn save_clients(&mut self, clients: &[ClientRecord]) -> Result<(), StoreError>;
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Default)]
struct MemoryState {
    identity: Option<StoredIdentity>,
    clients: Vec<ClientRecord>,
    fail_saves: bool,
    saves: usize,
}

/// In-memory storage. Clones share state, which lets a test "restart" the
/// device by building a new state machine over the same storage.
#[derive(Clone, Default)]
pub struct MemoryKeyStorage {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryKeyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent save fail.
    pub fn set_fail_saves(&self, fail: bool) {
        self.state().fail_saves = fail;
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.state().saves
    }

    pub fn clients(&self) -> Vec<ClientRecord> {
        self.state().clients.clone()
    }
}

impl KeyStorage for MemoryKeyStorage {
    fn load_identity(&self) -> Result<Option<StoredIdentity>, StoreError> {
        Ok(self.state().identity.clone())
    }

    fn save_identity(&mut self, identity: &StoredIdentity) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.fail_saves {
            return Err(StoreError::OperationFailed("memory storage is read-only".into()));
        }
        state.identity = Some(identity.clone());
        state.saves += 1;
        Ok(())
    }

    fn load_clients(&self) -> Result<Vec<ClientRecord>, StoreError> {
        Ok(self.state().clients.clone())
    }

    fn save_clients(&mut self, clients: &[ClientRecord]) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.fail_saves {
            return Err(StoreError::OperationFailed("memory storage is read-only".into()));
        }
        state.clients = clients.to_vec();
        state.saves += 1;
        Ok(())
    }
}

// ============================================================================
// File backend
// ============================================================================

mod hex_key {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(d)?;
        let bytes = hex::decode(&text).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|b: Vec<u8>| D::Error::custom(format!("expected 32 bytes, got {}", b.len())))
    }
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct IdentityEntry {
    #[serde(with = "hex_key")]
    public_key: [u8; 32],
    #[serde(with = "hex_key")]
    secret_key: [u8; 32],
    name: String,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct ClientEntry {
    #[serde(with = "hex_key")]
    public_key: [u8; 32],
    #[serde(with = "hex_key")]
    tx_key: [u8; 32],
    #[serde(with = "hex_key")]
    rx_key: [u8; 32],
    paired_at: i64,
}

#[derive(Serialize, Deserialize)]
struct KeyFile {
    version: u32,
    identity: Option<IdentityEntry>,
    #[serde(default)]
    clients: Vec<ClientEntry>,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

/// All keys in one JSON file.
///
/// The file is read once on open; every save rewrites it through a
/// temporary file and a rename so a crash never leaves a torn file.
pub struct FileKeyStorage {
    path: PathBuf,
    identity: Option<StoredIdentity>,
    public_key: Option<PublicKeyBytes>,
    clients: Vec<ClientRecord>,
}

impl FileKeyStorage {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut storage = Self { path, identity: None, public_key: None, clients: Vec::new() };
        match Self::read(&storage.path) {
            Ok(Some(file)) => storage.absorb(&file),
            Ok(None) => info!(path = %storage.path.display(), "no key file, starting fresh"),
            Err(e) => warn!(path = %storage.path.display(), error = %e, "ignoring unusable key file"),
        }
        storage
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(path: &Path) -> Result<Option<KeyFile>, StoreError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let probe: VersionProbe =
            serde_json::from_str(&text).map_err(|e| StoreError::DataCorruption(e.to_string()))?;
        if probe.version != KEY_FILE_VERSION {
            return Err(StoreError::VersionMismatch {
                found: probe.version,
                expected: KEY_FILE_VERSION,
            });
        }
        let file: KeyFile =
            serde_json::from_str(&text).map_err(|e| StoreError::DataCorruption(e.to_string()))?;
        Ok(Some(file))
    }

    fn absorb(&mut self, file: &KeyFile) {
        if let Some(id) = &file.identity {
            self.identity = Some(StoredIdentity {
                secret_key: id.secret_key,
                device_name: id.name.clone(),
            });
            self.public_key = Some(id.public_key);
        }
        self.clients = file
            .clients
            .iter()
            .map(|c| ClientRecord {
                public_key: c.public_key,
                session_tx_key: c.tx_key,
                session_rx_key: c.rx_key,
                paired_at: c.paired_at,
            })
            .collect();
        debug!(clients = self.clients.len(), "key file loaded");
    }

    fn write(&self) -> Result<(), StoreError> {
        let identity = match (&self.identity, self.public_key) {
            (Some(id), Some(public_key)) => Some(IdentityEntry {
                public_key,
                secret_key: id.secret_key,
                name: id.device_name.clone(),
            }),
            _ => None,
        };
        let file = KeyFile {
            version: KEY_FILE_VERSION,
            identity,
            clients: self
                .clients
                .iter()
                .map(|c| ClientEntry {
                    public_key: c.public_key,
                    tx_key: c.session_tx_key,
                    rx_key: c.session_rx_key,
                    paired_at: c.paired_at,
                })
                .collect(),
        };
        let text = zeroize::Zeroizing::new(serde_json::to_string_pretty(&file)?);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, text.as_bytes())?;
        restrict_permissions(&tmp)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

impl KeyStorage for FileKeyStorage {
    fn load_identity(&self) -> Result<Option<StoredIdentity>, StoreError> {
        Ok(self.identity.clone())
    }

    fn save_identity(&mut self, identity: &StoredIdentity) -> Result<(), StoreError> {
        let keypair = swb_crypto::LongTermKeyPair::from_secret_bytes(identity.secret_key);
        self.public_key = Some(keypair.public_bytes());
        self.identity = Some(identity.clone());
        self.write()
    }

    fn load_clients(&self) -> Result<Vec<ClientRecord>, StoreError> {
        Ok(self.clients.clone())
    }

    fn save_clients(&mut self, clients: &[ClientRecord]) -> Result<(), StoreError> {
        self.clients = clients.to_vec();
        self.write()
    }
}

// ============================================================================
// Client key store
// ============================================================================

/// Paired clients known to the device.
pub struct ClientKeyStore {
    records: Vec<ClientRecord>,
    storage: Box<dyn KeyStorage + Send>,
    max_clients: usize,
}

impl ClientKeyStore {
    /// Load the stored records. A storage error yields an empty store.
    pub fn load(storage: Box<dyn KeyStorage + Send>, max_clients: usize) -> Self {
        let records = match storage.load_clients() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "client records unavailable, starting empty");
                Vec::new()
            }
        };
        let mut store = Self { records, storage, max_clients: max_clients.max(1) };
        store.evict_oldest(None);
        info!(clients = store.records.len(), "client key store loaded");
        store
    }

    pub fn records(&self) -> &[ClientRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find_by_public_key(&self, key: &PublicKeyBytes) -> Option<&ClientRecord> {
        self.records.iter().find(|r| keys_equal(&r.public_key, key))
    }

    /// Replace the record with the same public key, or add it. When the
    /// store is full the oldest of the other records makes room; the
    /// upserted record always survives, whatever its `paired_at`.
    pub fn upsert(&mut self, record: ClientRecord) {
        let key = record.public_key;
        match self.records.iter_mut().find(|r| keys_equal(&r.public_key, &key)) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
        self.evict_oldest(Some(&key));
    }

    pub fn save(&mut self) -> Result<(), StoreError> {
        self.storage.save_clients(&self.records)
    }

    fn evict_oldest(&mut self, keep: Option<&PublicKeyBytes>) {
        while self.records.len() > self.max_clients {
            let Some(oldest) = self
                .records
                .iter()
                .enumerate()
                .filter(|(_, r)| keep.map_or(true, |k| !keys_equal(&r.public_key, k)))
                .min_by_key(|(_, r)| r.paired_at)
                .map(|(i, _)| i)
            else {
                break;
            };
            let evicted = self.records.remove(oldest);
            info!(client = %key_fingerprint(&evicted.public_key), "evicting oldest client record");
        }
    }
}
