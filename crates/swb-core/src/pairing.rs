//! Secure pairing state machine.
//!
//! One [`PairingStateMachine`] exists per device and owns the single live
//! [`PairingSession`]. The handshake runs:
//!
//! ```text
//! Initial
//!   --StartPairing / send ConnRequest-->            AwaitingPublicKey
//!   --ConnResponse / send Nonce-->                  AwaitingNonceAck
//!   --Ack(Nonce) / enable AEAD, send Challenge-->   AwaitingChallengeResponse
//!   --ChallengeResponse(c+1) / ChallengeSuccess-->  ConfirmedSharedSecret
//! ```
//!
//! Handshake messages up to the nonce ack travel in plaintext; from the ack
//! on everything is encrypted. Only `ConfirmedSharedSecret` reaches the
//! application handlers.
//!
//! # Threading
//!
//! The machine is not synchronized. It must be driven from a single thread
//! (see [`crate::reactor`]); handlers never call back into it, they queue
//! outbound frames on the transport and push signals and timer requests onto
//! internal queues that the reactor drains after every call.

mod handlers;

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use swb_crypto::hash::key_fingerprint;
use swb_proto::rts::{ConnResponse, ConnType, NonceBytes, NonceMessage, OtaProgress, OtaStatus};
use swb_proto::{decode, encode, CommsType, MessageTag, RtsMessage};

use crate::config::PairingConfig;
use crate::errors::{FaultKind, PairingError};
use crate::keys::KeyExchange;
use crate::services::DeviceServices;
use crate::store::{ClientKeyStore, ClientRecord};
use crate::transport::{LinkEvent, RtsTransport};

// ============================================================================
// Types
// ============================================================================

/// Handshake phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    Initial,
    AwaitingPublicKey,
    AwaitingNonceAck,
    AwaitingChallengeResponse,
    ConfirmedSharedSecret,
}

/// Events for the device's other subsystems.
#[derive(Clone, PartialEq, Eq)]
pub enum PairingSignal {
    /// Show this PIN on the device.
    PinUpdated(String),
    PairingCompleted,
    WifiCredentialsReceived { ssid: Vec<u8>, password: String },
    OtaUpdateRequested(String),
    /// The session was torn down. `forced` when the client or operator
    /// cancelled.
    Reset { forced: bool },
}

impl std::fmt::Debug for PairingSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PairingSignal::PinUpdated(_) => f.write_str("PinUpdated(<redacted>)"),
            PairingSignal::PairingCompleted => f.write_str("PairingCompleted"),
            PairingSignal::WifiCredentialsReceived { ssid, .. } => f
                .debug_struct("WifiCredentialsReceived")
                .field("ssid", &String::from_utf8_lossy(ssid))
                .finish_non_exhaustive(),
            PairingSignal::OtaUpdateRequested(url) => {
                f.debug_tuple("OtaUpdateRequested").field(url).finish()
            }
            PairingSignal::Reset { forced } => {
                f.debug_struct("Reset").field("forced", forced).finish()
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    PairingTimeout,
    WifiConnectPoll,
}

/// Timer requests for the reactor. A fired timer is reported back through
/// [`PairingStateMachine::on_timer`] with the generation it was started
/// under; timers from an earlier generation are ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerCommand {
    Start { kind: TimerKind, after: Duration, generation: u64 },
    Cancel(TimerKind),
}

/// An in-flight Wi-Fi connect waiting for the device to come online.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct WifiConnectPoll {
    pub ticks: u64,
    pub max_ticks: u64,
}

/// The single pairing attempt. Everything here is discarded on reset.
#[derive(Default)]
pub struct PairingSession {
    phase: Phase,
    comms: CommsType,
    pin: Option<Zeroizing<String>>,
    ping_challenge: u32,
    challenge_attempts: u32,
    abnormality_count: u32,
    to_robot_nonce: NonceBytes,
    to_device_nonce: NonceBytes,
    client: Option<[u8; 32]>,
    pub(crate) wifi_connect: Option<WifiConnectPoll>,
}

// ============================================================================
// State machine
// ============================================================================

pub struct PairingStateMachine<T: RtsTransport, S: DeviceServices> {
    config: PairingConfig,
    kex: KeyExchange,
    clients: ClientKeyStore,
    transport: T,
    services: S,
    session: PairingSession,
    pairing_mode: bool,
    ota_in_progress: bool,
    generation: u64,
    signals: VecDeque<PairingSignal>,
    timers: VecDeque<TimerCommand>,
}

impl<T: RtsTransport, S: DeviceServices> PairingStateMachine<T, S> {
    pub fn new(
        config: PairingConfig,
        kex: KeyExchange,
        clients: ClientKeyStore,
        transport: T,
        services: S,
    ) -> Self {
        Self {
            config,
            kex,
            clients,
            transport,
            services,
            session: PairingSession::default(),
            pairing_mode: false,
            ota_in_progress: false,
            generation: 0,
            signals: VecDeque::new(),
            timers: VecDeque::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    pub fn comms_type(&self) -> CommsType {
        self.session.comms
    }

    pub fn abnormality_count(&self) -> u32 {
        self.session.abnormality_count
    }

    pub fn challenge_attempts(&self) -> u32 {
        self.session.challenge_attempts
    }

    /// PIN of the first pairing in progress.
    pub fn pin(&self) -> Option<&str> {
        self.session.pin.as_ref().map(|p| p.as_str())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `(to_robot, to_device)` nonces issued for this session.
    pub fn nonces(&self) -> (&NonceBytes, &NonceBytes) {
        (&self.session.to_robot_nonce, &self.session.to_device_nonce)
    }

    pub fn is_pairing_mode_active(&self) -> bool {
        self.pairing_mode
    }

    pub fn is_ota_in_progress(&self) -> bool {
        self.ota_in_progress
    }

    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    pub fn key_exchange(&self) -> &KeyExchange {
        &self.kex
    }

    pub fn clients(&self) -> &ClientKeyStore {
        &self.clients
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn services(&self) -> &S {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut S {
        &mut self.services
    }

    pub fn drain_signals(&mut self) -> Vec<PairingSignal> {
        self.signals.drain(..).collect()
    }

    pub fn drain_timers(&mut self) -> Vec<TimerCommand> {
        self.timers.drain(..).collect()
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Begin a new negotiation, discarding any previous session.
    ///
    /// Refuses to start if the system RNG is unusable.
    pub fn start_pairing(&mut self) -> Result<(), PairingError> {
        self.kex.generate_nonce().map_err(|e| {
            error!(error = %e, "refusing to pair without a working RNG");
            PairingError::from(e)
        })?;

        self.transport.set_encrypted_channel_established(false);
        self.generation += 1;
        self.session = PairingSession::default();
        self.timers.push_back(TimerCommand::Cancel(TimerKind::WifiConnectPoll));

        let request = RtsMessage::ConnRequest { public_key: self.kex.public_key() };
        self.send(&request)?;
        self.session.phase = Phase::AwaitingPublicKey;
        self.timers.push_back(TimerCommand::Start {
            kind: TimerKind::PairingTimeout,
            after: self.config.pairing_timeout(),
            generation: self.generation,
        });
        info!(generation = self.generation, pairing_mode = self.pairing_mode, "pairing started");
        Ok(())
    }

    /// Operator or client cancellation.
    pub fn stop_pairing(&mut self) {
        self.reset(true);
    }

    /// Tear the session down. Safe to call in any phase, repeatedly.
    pub fn reset(&mut self, forced: bool) {
        info!(
            forced,
            phase = ?self.session.phase,
            abnormalities = self.session.abnormality_count,
            challenge_attempts = self.session.challenge_attempts,
            "resetting pairing session"
        );
        self.transport.set_encrypted_channel_established(false);
        self.session.comms = CommsType::Unencrypted;
        if let Err(e) = self.transport.send_plaintext(&encode(&RtsMessage::CancelPairing)) {
            debug!(error = %e, "cancel notification not delivered");
        }
        self.timers.push_back(TimerCommand::Cancel(TimerKind::PairingTimeout));
        self.timers.push_back(TimerCommand::Cancel(TimerKind::WifiConnectPoll));
        self.generation += 1;
        self.session = PairingSession::default();
        self.signals.push_back(PairingSignal::Reset { forced });
    }

    pub fn set_pairing_mode(&mut self, active: bool) {
        if self.pairing_mode != active {
            info!(active, "pairing mode changed");
        }
        self.pairing_mode = active;
    }

    pub fn set_ota_in_progress(&mut self, in_progress: bool) {
        if self.ota_in_progress != in_progress {
            info!(in_progress, "OTA state changed");
        }
        self.ota_in_progress = in_progress;
    }

    /// Entry point for everything the link delivers.
    pub fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::PlaintextReceived(frame) => self.handle_frame(CommsType::Unencrypted, &frame),
            LinkEvent::EncryptedReceived(frame) => self.handle_frame(CommsType::Encrypted, &frame),
            LinkEvent::DecryptionFailed => self.on_fault(PairingError::DecryptionFailed),
        }
    }

    /// A timer requested through [`TimerCommand::Start`] fired.
    pub fn on_timer(&mut self, kind: TimerKind, generation: u64) {
        if generation != self.generation {
            debug!(?kind, generation, current = self.generation, "ignoring stale timer");
            return;
        }
        match kind {
            TimerKind::PairingTimeout => {
                if self.session.phase != Phase::ConfirmedSharedSecret {
                    self.on_fault(PairingError::Timeout(self.session.phase));
                }
            }
            TimerKind::WifiConnectPoll => self.poll_wifi_connect(),
        }
    }

    /// Periodic tick from the reactor; follows a running OTA.
    pub fn heartbeat(&mut self) {
        if !self.ota_in_progress {
            return;
        }
        let progress = self.services.ota_progress();
        if let Err(e) = self.send_ota_progress(progress.status, progress.progress, progress.total) {
            self.on_fault(e);
        }
        if progress.status.is_terminal() {
            info!(status = ?progress.status, "OTA finished");
            self.ota_in_progress = false;
        }
    }

    /// Report OTA progress to an authenticated client. Dropped otherwise.
    pub fn send_ota_progress(
        &mut self,
        status: OtaStatus,
        progress: u64,
        total: u64,
    ) -> Result<(), PairingError> {
        if self.session.phase != Phase::ConfirmedSharedSecret {
            debug!(phase = ?self.session.phase, "no authenticated client for OTA progress");
            return Ok(());
        }
        self.send(&RtsMessage::OtaUpdateResponse(OtaProgress { status, progress, total }))
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    fn handle_frame(&mut self, channel: CommsType, frame: &[u8]) {
        let result = match decode(frame) {
            Ok(msg) => self.dispatch(channel, msg),
            Err(e) => Err(PairingError::Malformed(e)),
        };
        if let Err(e) = result {
            self.on_fault(e);
        }
    }

    fn dispatch(&mut self, channel: CommsType, msg: RtsMessage) -> Result<(), PairingError> {
        let tag = msg.tag();
        let phase = self.session.phase;
        debug!(?tag, ?phase, ?channel, "inbound message");

        if tag == MessageTag::CancelPairing {
            info!(?phase, "client cancelled pairing");
            self.stop_pairing();
            return Ok(());
        }
        let unexpected = PairingError::UnexpectedMessage { tag, phase, comms: channel };
        if tag.comms_type() != Some(channel) || channel != self.session.comms {
            return Err(unexpected);
        }

        match (phase, msg) {
            (Phase::AwaitingPublicKey, RtsMessage::ConnResponse(response)) => {
                self.on_conn_response(response)
            }
            (Phase::AwaitingNonceAck, RtsMessage::Ack { referenced_tag })
                if referenced_tag == MessageTag::Nonce.as_u32() =>
            {
                self.on_nonce_ack()
            }
            (Phase::AwaitingChallengeResponse, RtsMessage::ChallengeResponse { answer }) => {
                self.on_challenge_response(answer)
            }
            (Phase::ConfirmedSharedSecret, msg) if tag.is_application_request() => {
                self.handle_application(msg)
            }
            _ => Err(unexpected),
        }
    }

    fn on_fault(&mut self, err: PairingError) {
        let phase = self.session.phase;
        match err.kind() {
            FaultKind::ProtocolViolation => {
                self.session.abnormality_count += 1;
                warn!(
                    error = %err,
                    ?phase,
                    count = self.session.abnormality_count,
                    max = self.config.max_abnormality_count,
                    "protocol abnormality, message dropped"
                );
                if self.session.abnormality_count >= self.config.max_abnormality_count {
                    self.reset(false);
                }
            }
            FaultKind::AuthenticationFailure => {
                if matches!(err, PairingError::DecryptionFailed) {
                    warn!(?phase, "decryption failed, resetting");
                    self.reset(false);
                    return;
                }
                self.session.challenge_attempts += 1;
                warn!(
                    ?phase,
                    attempts = self.session.challenge_attempts,
                    max = self.config.max_challenge_attempts,
                    "challenge answer rejected"
                );
                if self.session.challenge_attempts >= self.config.max_challenge_attempts {
                    self.reset(false);
                }
            }
            FaultKind::UnknownClient | FaultKind::Timeout | FaultKind::RngUnavailable => {
                warn!(error = %err, ?phase, "pairing aborted");
                self.reset(false);
            }
            FaultKind::StorageFailure => {
                warn!(error = %err, "client record not persisted; client re-pairs after restart");
            }
            FaultKind::LinkFailure => {
                warn!(error = %err, ?phase, "outbound message lost");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Handshake
    // ------------------------------------------------------------------------

    fn on_conn_response(&mut self, response: ConnResponse) -> Result<(), PairingError> {
        let client = key_fingerprint(&response.public_key);
        match response.connection_type {
            ConnType::FirstTimePair => {
                if !self.pairing_mode || self.ota_in_progress {
                    return Err(PairingError::PairingModeInactive);
                }
                let pin = Zeroizing::new(self.kex.generate_pin(self.config.pin_digits)?);
                // A rejected peer key must not put a PIN on the display.
                let keys = self.kex.derive_server_session_keys(&response.public_key, &pin)?;
                self.signals.push_back(PairingSignal::PinUpdated(pin.as_str().to_owned()));
                self.session.pin = Some(pin);
                self.transport.set_crypto_keys(&keys);

                let record =
                    ClientRecord::new(response.public_key, &keys, chrono::Utc::now().timestamp());
                self.clients.upsert(record);
                if let Err(e) = self.clients.save() {
                    self.on_fault(PairingError::Storage(e));
                }
                info!(%client, "first-time pairing, PIN issued");
            }
            ConnType::Reconnect => {
                let keys = match self.clients.find_by_public_key(&response.public_key) {
                    Some(record) => record.session_keys(),
                    None => return Err(PairingError::UnknownClient(client)),
                };
                self.transport.set_crypto_keys(&keys);
                info!(%client, "reconnecting known client");
            }
        }
        self.session.client = Some(response.public_key);
        self.send_nonce()
    }

    fn send_nonce(&mut self) -> Result<(), PairingError> {
        let to_robot = self.kex.generate_nonce()?;
        let to_device = self.kex.generate_nonce()?;
        self.session.to_robot_nonce = to_robot;
        self.session.to_device_nonce = to_device;
        self.transport.set_nonce(&to_robot, &to_device);
        self.session.phase = Phase::AwaitingNonceAck;
        self.send(&RtsMessage::Nonce(NonceMessage { to_robot, to_device }))
    }

    fn on_nonce_ack(&mut self) -> Result<(), PairingError> {
        let challenge = self.kex.random_u32()?;
        self.transport.set_encrypted_channel_established(true);
        self.session.comms = CommsType::Encrypted;
        self.session.ping_challenge = challenge;
        self.session.phase = Phase::AwaitingChallengeResponse;
        debug!("encrypted channel established, challenging client");
        self.send(&RtsMessage::Challenge { value: challenge })
    }

    fn on_challenge_response(&mut self, answer: u32) -> Result<(), PairingError> {
        if answer != self.session.ping_challenge.wrapping_add(1) {
            return Err(PairingError::WrongChallengeAnswer);
        }
        self.session.phase = Phase::ConfirmedSharedSecret;
        self.session.pin = None;
        self.timers.push_back(TimerCommand::Cancel(TimerKind::PairingTimeout));
        self.signals.push_back(PairingSignal::PairingCompleted);
        info!(
            client = %self.session.client.map(|k| key_fingerprint(&k)).unwrap_or_default(),
            "pairing confirmed"
        );
        self.send(&RtsMessage::ChallengeSuccess)
    }

    // ------------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------------

    /// Send on the channel the session is currently using.
    fn send(&mut self, msg: &RtsMessage) -> Result<(), PairingError> {
        let payload = encode(msg);
        match self.session.comms {
            CommsType::Unencrypted => self.transport.send_plaintext(&payload)?,
            CommsType::Encrypted => self.transport.send_encrypted(&payload)?,
        }
        Ok(())
    }
}
