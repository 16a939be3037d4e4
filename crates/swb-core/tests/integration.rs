//! Integration tests for switchboard pairing flows.
//!
//! These drive the state machine through a sealing transport with a
//! simulated companion app, so every encrypted frame goes through the real
//! key exchange and AEAD channel.

use std::path::Path;

use proptest::prelude::*;

use swb_core::harness::{
    build_machine, deliver, run_handshake, sealed_machine, test_machine, FakeServices,
    RecordingTransport, TestClient, TestMachine,
};
use swb_core::keys::KeyExchange;
use swb_core::store::{ClientKeyStore, FileKeyStorage, MemoryKeyStorage};
use swb_core::transport::LinkEvent;
use swb_core::{PairingConfig, PairingSignal, PairingStateMachine, Phase};
use swb_proto::rts::{ConnResponse, ConnType, WifiConnState};
use swb_proto::{decode, encode, MessageTag, RtsMessage};

fn file_machine(path: &Path) -> TestMachine {
    let config = PairingConfig::default();
    let mut storage = FileKeyStorage::open(path);
    let kex = KeyExchange::load_or_generate(&mut storage, &config.device_name_prefix).unwrap();
    let clients = ClientKeyStore::load(Box::new(storage), config.max_clients);
    PairingStateMachine::new(
        config,
        kex,
        clients,
        RecordingTransport::sealing(),
        FakeServices::default(),
    )
}

/// Test: first pairing, then a reconnect after the device restarts
#[test]
fn integration_first_pair_then_reconnect() {
    let storage = MemoryKeyStorage::new();
    let mut client = TestClient::new().unwrap();

    let mut device = sealed_machine(storage.clone());
    device.set_pairing_mode(true);
    run_handshake(&mut device, &mut client, ConnType::FirstTimePair).unwrap();
    assert_eq!(device.phase(), Phase::ConfirmedSharedSecret);
    let identity = device.key_exchange().public_key();
    drop(device);
    client.disconnect();

    // Restart: same storage, pairing mode off, no PIN shown.
    let mut device = sealed_machine(storage.clone());
    assert_eq!(device.key_exchange().public_key(), identity);
    run_handshake(&mut device, &mut client, ConnType::Reconnect).unwrap();
    assert_eq!(device.phase(), Phase::ConfirmedSharedSecret);
    assert!(!device
        .drain_signals()
        .iter()
        .any(|s| matches!(s, PairingSignal::PinUpdated(_))));

    device.services_mut().wifi.state = WifiConnState::Online;
    deliver(&mut device, client.seal(&RtsMessage::StatusRequest).unwrap());
    let reply = device.transport_mut().take_sent();
    assert_eq!(reply.len(), 1);
    match client.open(&reply[0].wire).unwrap() {
        RtsMessage::StatusResponse(status) => assert_eq!(status.conn_state, WifiConnState::Online),
        other => panic!("unexpected reply: {:?}", other),
    }
}

/// Test: a client that typed the wrong PIN cannot authenticate
#[test]
fn integration_wrong_pin_resets() {
    let mut device = sealed_machine(MemoryKeyStorage::new());
    let mut client = TestClient::new().unwrap();
    device.set_pairing_mode(true);
    device.start_pairing().unwrap();
    let sent = device.transport_mut().take_sent();
    let device_public = match decode(&sent[0].wire).unwrap() {
        RtsMessage::ConnRequest { public_key } => public_key,
        other => panic!("unexpected frame: {:?}", other),
    };

    deliver(&mut device, client.conn_response(ConnType::FirstTimePair));
    let wrong = if device.pin() == Some("000000") { "111111" } else { "000000" };
    client.enter_pin(&device_public, wrong).unwrap();
    let sent = device.transport_mut().take_sent();
    let ack = client.accept_nonce(&sent[0].wire).unwrap();
    deliver(&mut device, ack);

    let sent = device.transport_mut().take_sent();
    assert!(client.open(&sent[0].wire).is_err());
    device.drain_signals();

    let forged = client.seal(&RtsMessage::ChallengeResponse { answer: 1 }).unwrap();
    deliver(&mut device, forged);

    assert_eq!(device.phase(), Phase::Initial);
    assert_eq!(device.drain_signals(), vec![PairingSignal::Reset { forced: false }]);
    assert!(!device.transport().encrypted_established());
}

/// Test: a device that never paired with the client refuses a reconnect
#[test]
fn integration_reconnect_to_other_device_fails() {
    let mut client = TestClient::new().unwrap();
    let mut first = sealed_machine(MemoryKeyStorage::new());
    first.set_pairing_mode(true);
    run_handshake(&mut first, &mut client, ConnType::FirstTimePair).unwrap();
    client.disconnect();

    let mut other = sealed_machine(MemoryKeyStorage::new());
    assert!(run_handshake(&mut other, &mut client, ConnType::Reconnect).is_err());
    assert_eq!(other.phase(), Phase::Initial);
    assert!(other.clients().is_empty());
}

/// Test: pairing one client evicts the oldest once the store is full
#[test]
fn integration_second_client_replaces_first() {
    let storage = MemoryKeyStorage::new();
    let mut device = sealed_machine(storage.clone());
    device.set_pairing_mode(true);

    let mut alice = TestClient::new().unwrap();
    run_handshake(&mut device, &mut alice, ConnType::FirstTimePair).unwrap();
    let mut bob = TestClient::new().unwrap();
    run_handshake(&mut device, &mut bob, ConnType::FirstTimePair).unwrap();

    let stored = storage.clients();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].public_key, bob.public_key());
}

/// Test: identity and client records survive a restart through the key file
#[test]
fn integration_key_file_persists_pairing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.json");
    let mut client = TestClient::new().unwrap();

    let mut device = file_machine(&path);
    device.set_pairing_mode(true);
    run_handshake(&mut device, &mut client, ConnType::FirstTimePair).unwrap();
    let identity = device.key_exchange().public_key();
    let name = device.key_exchange().device_name().to_string();
    drop(device);
    client.disconnect();

    let mut device = file_machine(&path);
    assert_eq!(device.key_exchange().public_key(), identity);
    assert_eq!(device.key_exchange().device_name(), name);
    run_handshake(&mut device, &mut client, ConnType::Reconnect).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["version"], 3);
    assert_eq!(json["clients"].as_array().unwrap().len(), 1);
}

/// Test: an unreadable key file starts the device fresh
#[test]
fn integration_corrupt_key_file_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.json");
    std::fs::write(&path, "{ not json").unwrap();

    let mut device = file_machine(&path);
    assert!(device.clients().is_empty());
    let mut client = TestClient::new().unwrap();
    device.set_pairing_mode(true);
    run_handshake(&mut device, &mut client, ConnType::FirstTimePair).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["version"], 3);
}

/// Test: a key file from another format version is not trusted
#[test]
fn integration_old_key_file_version_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.json");
    std::fs::write(&path, r#"{"version": 2, "identity": null, "clients": []}"#).unwrap();

    let device = file_machine(&path);
    assert!(device.clients().is_empty());
    assert!(device.key_exchange().device_name().starts_with("Vector-"));
}

/// Test: the PIN never reaches a client over the link
#[test]
fn integration_pin_never_sent() {
    let mut device = sealed_machine(MemoryKeyStorage::new());
    let client = TestClient::new().unwrap();
    device.set_pairing_mode(true);
    device.start_pairing().unwrap();
    device.transport_mut().take_sent();
    deliver(&mut device, client.conn_response(ConnType::FirstTimePair));
    let pin = device.pin().unwrap().to_string();

    let frames = device.transport().sent.clone();
    for frame in frames {
        assert!(!frame.wire.windows(pin.len()).any(|w| w == pin.as_bytes()));
    }
}

// ============================================================================
// Message-order fuzzing
// ============================================================================

#[derive(Debug, Clone)]
enum Inbound {
    FirstPair,
    NonceAck,
    Answer(u32),
    Request(MessageTag),
    Cancel,
    Garbage(Vec<u8>),
}

fn inbound() -> impl Strategy<Value = (bool, Inbound)> {
    let message = prop_oneof![
        Just(Inbound::FirstPair),
        Just(Inbound::NonceAck),
        any::<u32>().prop_map(Inbound::Answer),
        prop_oneof![
            Just(MessageTag::StatusRequest),
            Just(MessageTag::WifiScanRequest),
            Just(MessageTag::WifiIpRequest),
            Just(MessageTag::OtaCancelRequest),
            Just(MessageTag::LogRequest),
        ]
        .prop_map(Inbound::Request),
        Just(Inbound::Cancel),
        prop::collection::vec(any::<u8>(), 0..48).prop_map(Inbound::Garbage),
    ];
    (any::<bool>(), message)
}

fn request(tag: MessageTag) -> RtsMessage {
    match tag {
        MessageTag::StatusRequest => RtsMessage::StatusRequest,
        MessageTag::WifiScanRequest => RtsMessage::WifiScanRequest,
        MessageTag::WifiIpRequest => RtsMessage::WifiIpRequest,
        MessageTag::OtaCancelRequest => RtsMessage::OtaCancelRequest,
        _ => RtsMessage::LogRequest,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// No ordering of inbound messages reaches a handler without the
    /// correct challenge answer.
    #[test]
    fn prop_handlers_unreachable_before_confirmation(
        script in prop::collection::vec(inbound(), 1..40),
    ) {
        let (mut m, _) = test_machine(MemoryKeyStorage::new());
        let peer = swb_crypto::LongTermKeyPair::generate().unwrap();
        m.set_pairing_mode(true);
        m.start_pairing().unwrap();

        for (sealed, step) in script {
            let payload = match step {
                Inbound::FirstPair => encode(&RtsMessage::ConnResponse(ConnResponse {
                    connection_type: ConnType::FirstTimePair,
                    public_key: peer.public_bytes(),
                })),
                Inbound::NonceAck => {
                    encode(&RtsMessage::Ack { referenced_tag: MessageTag::Nonce.as_u32() })
                }
                Inbound::Answer(answer) => encode(&RtsMessage::ChallengeResponse { answer }),
                Inbound::Request(tag) => encode(&request(tag)),
                Inbound::Cancel => encode(&RtsMessage::CancelPairing),
                Inbound::Garbage(bytes) => bytes,
            };
            let event = if sealed {
                LinkEvent::EncryptedReceived(payload)
            } else {
                LinkEvent::PlaintextReceived(payload)
            };
            m.handle_link_event(event);

            if m.phase() == Phase::ConfirmedSharedSecret {
                // 2^-32 per answer; the machine did authenticate correctly.
                return Ok(());
            }
            prop_assert!(m.services().calls.is_empty());
            prop_assert!(m.abnormality_count() < m.config().max_abnormality_count);
        }
    }
}

/// Test: the harness builder shares storage with the caller
#[test]
fn integration_builder_uses_given_storage() {
    let storage = MemoryKeyStorage::new();
    let m = build_machine(
        PairingConfig { max_clients: 3, ..Default::default() },
        storage.clone(),
        RecordingTransport::new(),
        FakeServices::default(),
    );
    assert_eq!(m.config().max_clients, 3);
    assert_eq!(storage.save_count(), 1);
}
