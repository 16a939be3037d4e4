//! Validation helpers for RTS message fields.
//!
//! Checks are applied while converting wire messages into
//! [`crate::rts::RtsMessage`], so the state machine only ever sees
//! correctly sized keys, nonces and addresses.

/// Validation error types for protocol messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Field has invalid size (expected, actual)
    InvalidSize { field: &'static str, expected: usize, actual: usize },
    /// Field exceeds its maximum length
    TooLong { field: &'static str, max: usize, actual: usize },
    /// Required field is empty
    EmptyField { field: &'static str },
    /// Enumerated field carries an unknown value
    UnknownVariant { field: &'static str, value: i32 },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSize { field, expected, actual } => {
                write!(f, "field '{}' has invalid size: expected {}, got {}", field, expected, actual)
            }
            Self::TooLong { field, max, actual } => {
                write!(f, "field '{}' is {} bytes, maximum is {}", field, actual, max)
            }
            Self::EmptyField { field } => {
                write!(f, "required field '{}' is empty", field)
            }
            Self::UnknownVariant { field, value } => {
                write!(f, "field '{}' has unknown value {}", field, value)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Constants for field sizes.
pub mod sizes {
    /// X25519 public keys.
    pub const PUBLIC_KEY_SIZE: usize = 32;
    /// XChaCha20-Poly1305 nonces.
    pub const NONCE_SIZE: usize = 24;
    /// IEEE 802.11 SSIDs.
    pub const MAX_SSID_SIZE: usize = 32;
    pub const IPV4_SIZE: usize = 4;
    pub const IPV6_SIZE: usize = 16;
}

/// Copy a byte field into a fixed-size array, rejecting any other length.
pub fn fixed_array<const N: usize>(field: &'static str, data: &[u8]) -> ValidationResult<[u8; N]> {
    data.try_into().map_err(|_| ValidationError::InvalidSize {
        field,
        expected: N,
        actual: data.len(),
    })
}

/// Like [`fixed_array`], but an empty field means "absent".
pub fn optional_array<const N: usize>(
    field: &'static str,
    present: bool,
    data: &[u8],
) -> ValidationResult<Option<[u8; N]>> {
    if !present && data.is_empty() {
        return Ok(None);
    }
    fixed_array(field, data).map(Some)
}

/// Validate that an SSID fits in 32 bytes.
pub fn validate_ssid(field: &'static str, ssid: &[u8]) -> ValidationResult<()> {
    if ssid.len() > sizes::MAX_SSID_SIZE {
        return Err(ValidationError::TooLong {
            field,
            max: sizes::MAX_SSID_SIZE,
            actual: ssid.len(),
        });
    }
    Ok(())
}

/// Validate that a string field is not empty.
pub fn validate_not_empty(field: &'static str, value: &str) -> ValidationResult<()> {
    if value.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_array_exact() {
        let key: [u8; 32] = fixed_array("public_key", &[7u8; 32]).unwrap();
        assert_eq!(key, [7u8; 32]);
    }

    #[test]
    fn test_fixed_array_wrong_size() {
        let err = fixed_array::<32>("public_key", &[0u8; 31]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidSize { field: "public_key", expected: 32, actual: 31 }
        );
    }

    #[test]
    fn test_optional_array() {
        assert_eq!(optional_array::<4>("ip_v4", false, &[]).unwrap(), None);
        assert_eq!(optional_array::<4>("ip_v4", true, &[10, 0, 0, 1]).unwrap(), Some([10, 0, 0, 1]));
        assert!(optional_array::<4>("ip_v4", true, &[]).is_err());
    }

    #[test]
    fn test_ssid_limit() {
        assert!(validate_ssid("wifi_ssid", &[b'a'; 32]).is_ok());
        assert!(validate_ssid("wifi_ssid", &[b'a'; 33]).is_err());
    }
}
