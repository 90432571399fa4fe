//! Type definitions for security state tracking
use std::fmt;
use thiserror::Error;

/// Pairing failure reported alongside a security change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SecurityError {
    #[error("Passkey entry failed")]
    PasskeyEntryFailed,

    #[error("OOB data not available")]
    OobNotAvailable,

    #[error("Authentication requirements not met")]
    AuthenticationRequirements,

    #[error("Confirm value failed")]
    ConfirmValueFailed,

    #[error("Pairing not supported")]
    PairingNotSupported,

    #[error("Encryption key size issue")]
    EncryptionKeySize,

    #[error("Unspecified reason")]
    UnspecifiedReason,

    #[error("Too many pairing attempts")]
    RepeatedAttempts,

    #[error("Invalid parameters")]
    InvalidParameters,

    #[error("DHKey check failed")]
    DhKeyCheckFailed,

    #[error("Numeric comparison failed")]
    NumericComparisonFailed,

    #[error("Key rejected by peer")]
    KeyRejected,

    #[error("Unknown pairing failure (0x{0:02x})")]
    Other(u8),
}

impl SecurityError {
    /// Convert from a pairing failed reason code
    pub fn from_reason(reason: u8) -> Self {
        match reason {
            0x01 => SecurityError::PasskeyEntryFailed,
            0x02 => SecurityError::OobNotAvailable,
            0x03 => SecurityError::AuthenticationRequirements,
            0x04 => SecurityError::ConfirmValueFailed,
            0x05 => SecurityError::PairingNotSupported,
            0x06 => SecurityError::EncryptionKeySize,
            0x08 => SecurityError::UnspecifiedReason,
            0x09 => SecurityError::RepeatedAttempts,
            0x0A => SecurityError::InvalidParameters,
            0x0B => SecurityError::DhKeyCheckFailed,
            0x0C => SecurityError::NumericComparisonFailed,
            0x0F => SecurityError::KeyRejected,
            other => SecurityError::Other(other),
        }
    }
}

/// Security level for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecurityLevel {
    /// No security (unencrypted)
    None = 1,
    /// Encryption without authentication (Just Works)
    EncryptionOnly = 2,
    /// Encryption with authentication (MITM protection)
    EncryptionWithAuthentication = 3,
    /// Secure Connections with encryption and authentication
    SecureConnections = 4,
}

impl SecurityLevel {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(SecurityLevel::None),
            2 => Some(SecurityLevel::EncryptionOnly),
            3 => Some(SecurityLevel::EncryptionWithAuthentication),
            4 => Some(SecurityLevel::SecureConnections),
            _ => None,
        }
    }

    /// Check if this security level includes encryption
    pub fn is_encrypted(&self) -> bool {
        *self >= SecurityLevel::EncryptionOnly
    }

    /// Check if this security level includes authentication
    pub fn is_authenticated(&self) -> bool {
        *self >= SecurityLevel::EncryptionWithAuthentication
    }

    /// Check if this security level uses Secure Connections
    pub fn is_secure_connections(&self) -> bool {
        *self >= SecurityLevel::SecureConnections
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level {}", *self as u8)
    }
}
