//! Test doubles for the pairing core.
//!
//! [`RecordingTransport`] and [`FakeServices`] stand in for the link adapter
//! and the device collaborators; [`TestClient`] plays the companion app with
//! real key exchange and AEAD so end-to-end flows can be driven without a
//! radio.

use std::collections::VecDeque;
use std::io;

use thiserror::Error;

use swb_crypto::{ChannelError, KexError, LongTermKeyPair, Role, SecureChannel, SessionKeys};
use swb_proto::rts::{
    ConnResponse, ConnType, ConnectWifiResult, NonceBytes, OtaProgress, OtaStatus, PublicKeyBytes,
    WifiConnState, WifiConnectRequest, WifiIpResponse, WifiScanResponse,
};
use swb_proto::{decode, encode, CommsType, DecodeError, MessageTag, RtsMessage};

use crate::config::PairingConfig;
use crate::errors::{PairingError, TransportError};
use crate::keys::KeyExchange;
use crate::pairing::{PairingStateMachine, Phase};
use crate::services::{DeviceInfo, DeviceServices, WifiStatus};
use crate::store::{ClientKeyStore, MemoryKeyStorage};
use crate::transport::{LinkEvent, RtsTransport};

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("expected {0}, got {1}")]
    Unexpected(&'static str, String),
    #[error("no encrypted channel")]
    NoChannel,
    #[error("channel: {0}")]
    Channel(#[from] ChannelError),
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),
    #[error("key exchange: {0}")]
    Kex(#[from] KexError),
    #[error("pairing: {0}")]
    Pairing(#[from] PairingError),
}

// ============================================================================
// Transport
// ============================================================================

/// One outbound frame. `payload` is the encoded message, `wire` what a peer
/// would receive (ciphertext when sealed).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentFrame {
    pub comms: CommsType,
    pub payload: Vec<u8>,
    pub wire: Vec<u8>,
}

/// Records everything the state machine configures and sends.
///
/// Built with [`RecordingTransport::new`] it passes frames through untouched;
/// [`RecordingTransport::sealing`] runs a real [`SecureChannel`] so a
/// [`TestClient`] can talk to it.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub sent: Vec<SentFrame>,
    pub fail_sends: bool,
    keys: Option<SessionKeys>,
    nonces: Option<(NonceBytes, NonceBytes)>,
    established: bool,
    sealing: bool,
    channel: Option<SecureChannel>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sealing() -> Self {
        Self { sealing: true, ..Self::default() }
    }

    pub fn encrypted_established(&self) -> bool {
        self.established
    }

    pub fn keys(&self) -> Option<&SessionKeys> {
        self.keys.as_ref()
    }

    /// Decoded view of [`RecordingTransport::sent`].
    pub fn sent_messages(&self) -> Vec<(CommsType, RtsMessage)> {
        self.sent
            .iter()
            .map(|f| (f.comms, decode(&f.payload).expect("state machine sent a valid frame")))
            .collect()
    }

    pub fn take_sent(&mut self) -> Vec<SentFrame> {
        std::mem::take(&mut self.sent)
    }
}

impl RtsTransport for RecordingTransport {
    fn set_crypto_keys(&mut self, keys: &SessionKeys) {
        self.keys = Some(keys.clone());
    }

    fn set_nonce(&mut self, to_robot: &NonceBytes, to_device: &NonceBytes) {
        self.nonces = Some((*to_robot, *to_device));
    }

    fn set_encrypted_channel_established(&mut self, established: bool) {
        self.established = established;
        self.channel = match (established, &self.keys, &self.nonces) {
            (true, Some(keys), Some((to_robot, to_device))) => {
                Some(SecureChannel::new(keys, *to_device, *to_robot))
            }
            _ => None,
        };
    }

    fn send_plaintext(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if self.fail_sends {
            return Err(TransportError::Closed);
        }
        self.sent.push(SentFrame {
            comms: CommsType::Unencrypted,
            payload: payload.to_vec(),
            wire: payload.to_vec(),
        });
        Ok(())
    }

    fn send_encrypted(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if self.fail_sends {
            return Err(TransportError::Closed);
        }
        if !self.established {
            return Err(TransportError::NotConfigured);
        }
        let wire = match (self.sealing, self.channel.as_mut()) {
            (false, _) => payload.to_vec(),
            (true, Some(channel)) => {
                channel.seal(payload).map_err(|e| TransportError::Crypto(e.to_string()))?
            }
            (true, None) => return Err(TransportError::NotConfigured),
        };
        self.sent.push(SentFrame { comms: CommsType::Encrypted, payload: payload.to_vec(), wire });
        Ok(())
    }

    fn open_frame(&mut self, frame: Vec<u8>) -> LinkEvent {
        if !self.established {
            return LinkEvent::PlaintextReceived(frame);
        }
        match (self.sealing, self.channel.as_mut()) {
            (true, Some(channel)) => match channel.open(&frame) {
                Ok(payload) => LinkEvent::EncryptedReceived(payload),
                Err(_) => LinkEvent::DecryptionFailed,
            },
            (true, None) => LinkEvent::DecryptionFailed,
            (false, _) => LinkEvent::EncryptedReceived(frame),
        }
    }
}

// ============================================================================
// Device services
// ============================================================================

/// Scriptable [`DeviceServices`].
#[derive(Debug, Default)]
pub struct FakeServices {
    pub wifi: WifiStatus,
    pub info: DeviceInfo,
    pub scan: WifiScanResponse,
    pub ip: WifiIpResponse,
    pub connect_result: ConnectWifiResult,
    /// Status reads after a connect before the device reports online.
    /// `None` never comes online.
    pub online_after_polls: Option<u32>,
    pub forget_fails: bool,
    /// `(ssid, password)` while the access point is up.
    pub access_point: Option<(String, String)>,
    pub refuse_ota: bool,
    pub ota_started: Vec<String>,
    pub ota_cancelled: bool,
    /// Progress reports handed out by `ota_progress`, oldest first.
    pub ota_script: VecDeque<OtaProgress>,
    pub logs: Vec<u8>,
    pub fail_logs: bool,
    /// Names of the calls received, in order.
    pub calls: Vec<&'static str>,
    pending_online: Option<u32>,
}

impl DeviceServices for FakeServices {
    fn wifi_status(&mut self) -> WifiStatus {
        self.calls.push("wifi_status");
        match self.pending_online {
            Some(0) => {
                self.wifi.state = WifiConnState::Online;
                self.pending_online = None;
            }
            Some(n) => self.pending_online = Some(n - 1),
            None => {}
        }
        self.wifi.clone()
    }

    fn device_info(&mut self) -> DeviceInfo {
        self.calls.push("device_info");
        self.info.clone()
    }

    fn wifi_scan(&mut self) -> WifiScanResponse {
        self.calls.push("wifi_scan");
        self.scan.clone()
    }

    fn wifi_connect(&mut self, request: &WifiConnectRequest) -> ConnectWifiResult {
        self.calls.push("wifi_connect");
        self.wifi.ssid = request.ssid.clone();
        self.pending_online = self.online_after_polls;
        self.connect_result
    }

    fn wifi_forget(&mut self, _ssid: &[u8], _delete_all: bool) -> bool {
        self.calls.push("wifi_forget");
        !self.forget_fails
    }

    fn set_access_point(&mut self, enable: bool, ssid: &str, password: &str) -> bool {
        self.calls.push("set_access_point");
        self.access_point = enable.then(|| (ssid.to_string(), password.to_string()));
        self.wifi.access_point = enable;
        true
    }

    fn wifi_ip(&mut self) -> WifiIpResponse {
        self.calls.push("wifi_ip");
        self.ip.clone()
    }

    fn start_ota(&mut self, url: &str) -> bool {
        self.calls.push("start_ota");
        if self.refuse_ota {
            return false;
        }
        self.ota_started.push(url.to_string());
        true
    }

    fn cancel_ota(&mut self) {
        self.calls.push("cancel_ota");
        self.ota_cancelled = true;
    }

    fn ota_progress(&mut self) -> OtaProgress {
        self.calls.push("ota_progress");
        self.ota_script
            .pop_front()
            .unwrap_or(OtaProgress { status: OtaStatus::InProgress, progress: 0, total: 0 })
    }

    fn collect_logs(&mut self) -> io::Result<Vec<u8>> {
        self.calls.push("collect_logs");
        if self.fail_logs {
            return Err(io::Error::new(io::ErrorKind::Other, "log tool exited with 1"));
        }
        Ok(self.logs.clone())
    }
}

// ============================================================================
// Machine construction
// ============================================================================

pub type TestMachine = PairingStateMachine<RecordingTransport, FakeServices>;

/// Build a machine whose identity and client records live in `storage`.
pub fn build_machine<T: RtsTransport, S: DeviceServices>(
    config: PairingConfig,
    storage: MemoryKeyStorage,
    transport: T,
    services: S,
) -> PairingStateMachine<T, S> {
    let mut identity = storage.clone();
    let kex = KeyExchange::load_or_generate(&mut identity, &config.device_name_prefix)
        .expect("device identity");
    let clients = ClientKeyStore::load(Box::new(storage), config.max_clients);
    PairingStateMachine::new(config, kex, clients, transport, services)
}

/// Machine with a pass-through transport. Returns the shared storage.
pub fn test_machine(storage: MemoryKeyStorage) -> (TestMachine, MemoryKeyStorage) {
    let machine = build_machine(
        PairingConfig::default(),
        storage.clone(),
        RecordingTransport::new(),
        FakeServices::default(),
    );
    (machine, storage)
}

/// Machine with a sealing transport for [`TestClient`] flows.
pub fn sealed_machine(storage: MemoryKeyStorage) -> TestMachine {
    build_machine(
        PairingConfig::default(),
        storage,
        RecordingTransport::sealing(),
        FakeServices::default(),
    )
}

pub fn plaintext(msg: &RtsMessage) -> LinkEvent {
    LinkEvent::PlaintextReceived(encode(msg))
}

/// An already-decrypted inbound message.
pub fn encrypted(msg: &RtsMessage) -> LinkEvent {
    LinkEvent::EncryptedReceived(encode(msg))
}

/// Run a first-time pairing against a pass-through machine.
pub fn drive_to_confirmed<S: DeviceServices>(
    m: &mut PairingStateMachine<RecordingTransport, S>,
) -> LongTermKeyPair {
    let peer = LongTermKeyPair::generate().expect("rng");
    m.set_pairing_mode(true);
    m.start_pairing().expect("start pairing");
    m.handle_link_event(plaintext(&RtsMessage::ConnResponse(ConnResponse {
        connection_type: ConnType::FirstTimePair,
        public_key: peer.public_bytes(),
    })));
    m.handle_link_event(plaintext(&RtsMessage::Ack { referenced_tag: MessageTag::Nonce.as_u32() }));
    let challenge = m
        .transport()
        .sent_messages()
        .into_iter()
        .rev()
        .find_map(|(_, msg)| match msg {
            RtsMessage::Challenge { value } => Some(value),
            _ => None,
        })
        .expect("challenge sent");
    m.handle_link_event(encrypted(&RtsMessage::ChallengeResponse {
        answer: challenge.wrapping_add(1),
    }));
    assert_eq!(m.phase(), Phase::ConfirmedSharedSecret);
    peer
}

// ============================================================================
// Client simulator
// ============================================================================

/// Companion app side of the handshake.
pub struct TestClient {
    keypair: LongTermKeyPair,
    keys: Option<SessionKeys>,
    channel: Option<SecureChannel>,
}

impl TestClient {
    pub fn new() -> Result<Self, HarnessError> {
        Ok(Self { keypair: LongTermKeyPair::generate()?, keys: None, channel: None })
    }

    pub fn public_key(&self) -> PublicKeyBytes {
        self.keypair.public_bytes()
    }

    pub fn keys(&self) -> Option<&SessionKeys> {
        self.keys.as_ref()
    }

    pub fn conn_response(&self, connection_type: ConnType) -> Vec<u8> {
        encode(&RtsMessage::ConnResponse(ConnResponse {
            connection_type,
            public_key: self.public_key(),
        }))
    }

    /// Derive session keys from the device key and the PIN the user typed.
    pub fn enter_pin(&mut self, device_public: &PublicKeyBytes, pin: &str) -> Result<(), HarnessError> {
        self.keys = Some(self.keypair.derive_session_keys(Role::Client, device_public, pin)?);
        Ok(())
    }

    /// Seed the channel from a `Nonce` frame and return the plaintext ack.
    pub fn accept_nonce(&mut self, frame: &[u8]) -> Result<Vec<u8>, HarnessError> {
        let nonce = match decode(frame)? {
            RtsMessage::Nonce(nonce) => nonce,
            other => return Err(HarnessError::Unexpected("Nonce", format!("{:?}", other.tag()))),
        };
        let keys = self.keys.as_ref().ok_or(HarnessError::NoChannel)?;
        self.channel = Some(SecureChannel::new(keys, nonce.to_robot, nonce.to_device));
        Ok(encode(&RtsMessage::Ack { referenced_tag: MessageTag::Nonce.as_u32() }))
    }

    pub fn seal(&mut self, msg: &RtsMessage) -> Result<Vec<u8>, HarnessError> {
        let channel = self.channel.as_mut().ok_or(HarnessError::NoChannel)?;
        Ok(channel.seal(&encode(msg))?)
    }

    pub fn open(&mut self, frame: &[u8]) -> Result<RtsMessage, HarnessError> {
        let channel = self.channel.as_mut().ok_or(HarnessError::NoChannel)?;
        Ok(decode(&channel.open(frame)?)?)
    }

    /// Drop the link but keep the pairing keys.
    pub fn disconnect(&mut self) {
        self.channel = None;
    }
}

/// Feed raw link bytes through the transport into the machine.
pub fn deliver<S: DeviceServices>(
    m: &mut PairingStateMachine<RecordingTransport, S>,
    frame: Vec<u8>,
) {
    let event = m.transport_mut().open_frame(frame);
    m.handle_link_event(event);
}

fn take_one<S: DeviceServices>(
    m: &mut PairingStateMachine<RecordingTransport, S>,
) -> Result<SentFrame, HarnessError> {
    let mut sent = m.transport_mut().take_sent();
    match sent.len() {
        1 => Ok(sent.remove(0)),
        n => Err(HarnessError::Unexpected("one outbound frame", format!("{} frames", n))),
    }
}

/// Full handshake through a sealing machine. A first pairing reads the PIN
/// from the machine, as the user would from the screen.
pub fn run_handshake<S: DeviceServices>(
    m: &mut PairingStateMachine<RecordingTransport, S>,
    client: &mut TestClient,
    connection_type: ConnType,
) -> Result<(), HarnessError> {
    m.start_pairing()?;
    let device_public = match decode(&take_one(m)?.wire)? {
        RtsMessage::ConnRequest { public_key } => public_key,
        other => return Err(HarnessError::Unexpected("ConnRequest", format!("{:?}", other.tag()))),
    };

    deliver(m, client.conn_response(connection_type));
    if connection_type == ConnType::FirstTimePair {
        let pin = m.pin().ok_or(HarnessError::Unexpected("PIN", "none".into()))?.to_string();
        client.enter_pin(&device_public, &pin)?;
    }
    let ack = client.accept_nonce(&take_one(m)?.wire)?;
    deliver(m, ack);

    let value = match client.open(&take_one(m)?.wire)? {
        RtsMessage::Challenge { value } => value,
        other => return Err(HarnessError::Unexpected("Challenge", format!("{:?}", other.tag()))),
    };
    let answer = client.seal(&RtsMessage::ChallengeResponse { answer: value.wrapping_add(1) })?;
    deliver(m, answer);

    match client.open(&take_one(m)?.wire)? {
        RtsMessage::ChallengeSuccess => Ok(()),
        other => Err(HarnessError::Unexpected("ChallengeSuccess", format!("{:?}", other.tag()))),
    }
}
