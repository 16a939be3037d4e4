//! Tunables for the pairing state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use swb_crypto::channel::TAG_LEN;

use crate::errors::ConfigError;

// oneof key and length, four u32 fields, chunk key and length
const FILE_DOWNLOAD_OVERHEAD: usize = 64;

/// Largest log chunk whose sealed `FileDownload` still fits a `u16` frame.
pub const MAX_FILE_CHUNK_SIZE: usize = u16::MAX as usize - FILE_DOWNLOAD_OVERHEAD - TAG_LEN;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Time allowed from `StartPairing` to `ConfirmedSharedSecret`.
    pub pairing_timeout_secs: u64,
    pub max_challenge_attempts: u32,
    pub max_abnormality_count: u32,
    pub pin_digits: usize,
    /// Digits in a generated access-point password.
    pub ap_password_len: usize,
    pub wifi_connect_min_timeout_secs: u32,
    /// Used when a connect request carries no timeout.
    pub wifi_connect_default_timeout_secs: u32,
    pub wifi_poll_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub file_chunk_size: usize,
    /// Stored client records; the oldest is evicted beyond this.
    pub max_clients: usize,
    pub device_name_prefix: String,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            pairing_timeout_secs: 60,
            max_challenge_attempts: 5,
            max_abnormality_count: 5,
            pin_digits: 6,
            ap_password_len: 8,
            wifi_connect_min_timeout_secs: 1,
            wifi_connect_default_timeout_secs: 15,
            wifi_poll_interval_ms: 1000,
            heartbeat_interval_ms: 1000,
            file_chunk_size: 256,
            max_clients: 1,
            device_name_prefix: "Vector".to_string(),
        }
    }
}

impl PairingConfig {
    pub fn pairing_timeout(&self) -> Duration {
        Duration::from_secs(self.pairing_timeout_secs)
    }

    pub fn wifi_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wifi_poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pairing_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "pairing_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.max_challenge_attempts == 0 || self.max_abnormality_count == 0 {
            return Err(ConfigError::ValidationError(
                "retry budgets must be at least 1".to_string(),
            ));
        }
        if !(4..=12).contains(&self.pin_digits) {
            return Err(ConfigError::ValidationError(
                "pin_digits must be between 4 and 12".to_string(),
            ));
        }
        if !(8..=16).contains(&self.ap_password_len) {
            return Err(ConfigError::ValidationError(
                "ap_password_len must be between 8 and 16".to_string(),
            ));
        }
        if self.wifi_poll_interval_ms == 0 || self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll and heartbeat intervals must be non-zero".to_string(),
            ));
        }
        if self.file_chunk_size == 0 || self.file_chunk_size > MAX_FILE_CHUNK_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "file_chunk_size must be between 1 and {}",
                MAX_FILE_CHUNK_SIZE
            )));
        }
        if self.max_clients == 0 {
            return Err(ConfigError::ValidationError(
                "max_clients must be at least 1".to_string(),
            ));
        }
        if self.device_name_prefix.is_empty() || self.device_name_prefix.len() > 26 {
            // name is "<prefix>-XXXX" and doubles as a 32-byte SSID
            return Err(ConfigError::ValidationError(
                "device_name_prefix must be 1 to 26 bytes".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PairingConfig::default();
        config.validate().unwrap();
        assert_eq!(config.pairing_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_abnormality_count, 5);
        assert_eq!(config.pin_digits, 6);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: PairingConfig = serde_json::from_str(r#"{"max_clients": 4}"#).unwrap();
        assert_eq!(config.max_clients, 4);
        assert_eq!(config.file_chunk_size, 256);
    }

    #[test]
    fn test_rejects_oversized_chunk() {
        let config = PairingConfig { file_chunk_size: 70_000, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_largest_chunk_fits_sealed_frame() {
        use swb_crypto::{SecureChannel, SessionKeys};
        use swb_proto::rts::FileChunk;
        use swb_proto::{encode, RtsMessage};

        let config = PairingConfig { file_chunk_size: MAX_FILE_CHUNK_SIZE, ..Default::default() };
        config.validate().unwrap();
        let too_big = PairingConfig { file_chunk_size: MAX_FILE_CHUNK_SIZE + 1, ..Default::default() };
        assert!(too_big.validate().is_err());

        let payload = encode(&RtsMessage::FileDownload(FileChunk {
            status: u32::MAX,
            file_id: u32::MAX,
            offset: u32::MAX,
            total: u32::MAX,
            chunk: vec![0xA5; MAX_FILE_CHUNK_SIZE],
        }));
        let keys = SessionKeys::new([1; 32], [2; 32]);
        let sealed = SecureChannel::new(&keys, [3; 24], [4; 24]).seal(&payload).unwrap();
        assert!(sealed.len() <= u16::MAX as usize);
    }

    #[test]
    fn test_rejects_zero_clients() {
        let config = PairingConfig { max_clients: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
