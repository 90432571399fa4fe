//! Error types for the rustyperiph library
//!
//! This module defines the error types shared by the advertising registry,
//! the connection controller and the key store.

use crate::gap::{PeerAddress, SetId};
use crate::radio::RadioError;
use thiserror::Error;

/// Errors surfaced by the peripheral session core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("No free advertising context")]
    ResourceExhausted,

    #[error("Advertising set {0} is already running")]
    AlreadyRunning(SetId),

    #[error("Invalid state for operation: {0}")]
    InvalidState(String),

    #[error("Advertising payload too large: {len} bytes (limit {max})")]
    InvalidPayload { len: usize, max: usize },

    #[error("Invalid advertising parameters: {0}")]
    InvalidParameters(String),

    #[error("Link layer rejected request (status 0x{0:02x})")]
    LinkLayerRejected(u8),

    #[error("Connection failed (status 0x{0:02x})")]
    ConnectionFailed(u8),

    #[error("Key record for {0} not found after store")]
    KeyRecordNotFound(PeerAddress),

    #[error("Unknown advertising set {0}")]
    UnknownSet(SetId),

    #[error("Bond storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Session aborted after an invariant violation")]
    SessionFaulted,
}

impl SessionError {
    /// Whether this error breaks a session invariant and must abort the session
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::KeyRecordNotFound(_))
    }
}

impl From<RadioError> for SessionError {
    fn from(err: RadioError) -> Self {
        match err {
            RadioError::ResourceExhausted => SessionError::ResourceExhausted,
            RadioError::InvalidParameters => {
                SessionError::InvalidParameters("rejected by radio".into())
            }
            RadioError::AlreadyActive => {
                SessionError::InvalidState("advertising context already active".into())
            }
            RadioError::PayloadTooLarge { len, max } => SessionError::InvalidPayload { len, max },
            RadioError::Rejected(code) => SessionError::LinkLayerRejected(code),
        }
    }
}

/// Errors reported by a bond persistence backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
