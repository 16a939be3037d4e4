//! Error types for the pairing core.
//!
//! Every failure the state machine can observe is a [`PairingError`]; its
//! [`FaultKind`] decides how the session recovers.

use thiserror::Error;

use swb_crypto::KexError;
use swb_proto::{CommsType, DecodeError, MessageTag};

use crate::pairing::Phase;

// ============================================================================
// Fault taxonomy
// ============================================================================

/// How a failure is recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Wrong phase or channel, or unparseable bytes. Budgeted by the
    /// abnormality counter.
    ProtocolViolation,
    /// Wrong challenge answer (budgeted) or AEAD failure (immediate reset).
    AuthenticationFailure,
    /// Reconnect from a public key with no stored record.
    UnknownClient,
    /// Client key store write failed. Logged, never fatal.
    StorageFailure,
    /// Pairing did not complete in time.
    Timeout,
    /// No usable CSPRNG.
    RngUnavailable,
    /// Outbound send failed. Logged; link loss is reported separately.
    LinkFailure,
}

// ============================================================================
// Component errors
// ============================================================================

/// Errors that can occur during key store operations.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("storage operation failed: {0}")]
    OperationFailed(String),

    #[error("data corruption detected: {0}")]
    DataCorruption(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key file version {found} not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::OperationFailed(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Errors raised by a transport adapter.
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("link is not connected")]
    Closed,

    #[error("encrypted send before session keys were configured")]
    NotConfigured,

    #[error("frame of {0} bytes exceeds the link limit")]
    FrameTooLarge(usize),

    #[error("channel error: {0}")]
    Crypto(String),

    #[error("i/o error: {0}")]
    Io(String),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),
    #[error("config parse error: {0}")]
    ParseError(String),
    #[error("config validation error: {0}")]
    ValidationError(String),
}

// ============================================================================
// Pairing errors
// ============================================================================

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("{tag:?} not accepted in {phase:?} over {comms:?} channel")]
    UnexpectedMessage { tag: MessageTag, phase: Phase, comms: CommsType },

    #[error("undecodable frame: {0}")]
    Malformed(#[from] DecodeError),

    #[error("first-time pairing requested outside pairing mode")]
    PairingModeInactive,

    #[error("peer public key rejected")]
    InvalidPeerKey,

    #[error("challenge answer mismatch")]
    WrongChallengeAnswer,

    #[error("inbound ciphertext failed authentication")]
    DecryptionFailed,

    #[error("reconnect from unknown client {0}")]
    UnknownClient(String),

    #[error("client key store: {0}")]
    Storage(#[from] StoreError),

    #[error("pairing timed out in {0:?}")]
    Timeout(Phase),

    #[error("system RNG unavailable")]
    RngUnavailable,

    #[error("key derivation failed: {0}")]
    Derivation(String),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),
}

impl PairingError {
    pub fn kind(&self) -> FaultKind {
        match self {
            PairingError::UnexpectedMessage { .. }
            | PairingError::Malformed(_)
            | PairingError::PairingModeInactive
            | PairingError::InvalidPeerKey
            | PairingError::Derivation(_) => FaultKind::ProtocolViolation,
            PairingError::WrongChallengeAnswer | PairingError::DecryptionFailed => {
                FaultKind::AuthenticationFailure
            }
            PairingError::UnknownClient(_) => FaultKind::UnknownClient,
            PairingError::Storage(_) => FaultKind::StorageFailure,
            PairingError::Timeout(_) => FaultKind::Timeout,
            PairingError::RngUnavailable => FaultKind::RngUnavailable,
            PairingError::Transport(_) => FaultKind::LinkFailure,
        }
    }
}

impl From<KexError> for PairingError {
    fn from(e: KexError) -> Self {
        match e {
            KexError::RngUnavailable => PairingError::RngUnavailable,
            KexError::NonContributory => PairingError::InvalidPeerKey,
            other => PairingError::Derivation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kex_errors_map_to_faults() {
        assert_eq!(PairingError::from(KexError::RngUnavailable).kind(), FaultKind::RngUnavailable);
        assert_eq!(
            PairingError::from(KexError::NonContributory).kind(),
            FaultKind::ProtocolViolation
        );
    }

    #[test]
    fn test_decode_failure_is_protocol_violation() {
        let err = PairingError::from(DecodeError::TooShort(1));
        assert_eq!(err.kind(), FaultKind::ProtocolViolation);
    }

    #[test]
    fn test_authentication_failures() {
        assert_eq!(PairingError::DecryptionFailed.kind(), FaultKind::AuthenticationFailure);
        assert_eq!(PairingError::WrongChallengeAnswer.kind(), FaultKind::AuthenticationFailure);
    }

    #[test]
    fn test_display() {
        let err = PairingError::UnexpectedMessage {
            tag: MessageTag::WifiConnectRequest,
            phase: Phase::AwaitingNonceAck,
            comms: CommsType::Encrypted,
        };
        assert_eq!(
            err.to_string(),
            "WifiConnectRequest not accepted in AwaitingNonceAck over Encrypted channel"
        );
    }
}
