//! Link layer collaborator
//!
//! The session core never talks to a controller directly. Everything that
//! goes over the air is requested through [`Radio`]; completions come back
//! later as [`SessionEvent`](crate::session::SessionEvent)s.

use crate::gap::{AdvertisingParameters, DutyCycle, PeerAddress};
use std::fmt;
use thiserror::Error;

/// Radio-side handle of an advertising context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdvHandle(pub u8);

/// Link-layer connection handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnHandle(pub u16);

impl fmt::Display for ConnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// Failures reported synchronously by the radio
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    #[error("No advertising context available")]
    ResourceExhausted,

    #[error("Invalid advertising parameters")]
    InvalidParameters,

    #[error("Advertising context already active")]
    AlreadyActive,

    #[error("Payload too large: {len} bytes (limit {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Request rejected (status 0x{0:02x})")]
    Rejected(u8),
}

/// Everything the radio needs to start transmitting a set
#[derive(Debug, Clone, Copy)]
pub struct StartRequest<'a> {
    /// Identity address, when the set advertises with its identity
    pub identity: Option<PeerAddress>,
    /// Directed advertising target
    pub directed_peer: Option<PeerAddress>,
    pub duty: DutyCycle,
    pub payload: &'a [u8],
}

/// Requests the session core issues to the link layer
///
/// Implementations must not call back into the session synchronously;
/// connection and disconnection outcomes are delivered as events.
pub trait Radio {
    /// Allocate an advertising context for a new set
    fn create_advertising_context(
        &mut self,
        params: &AdvertisingParameters,
    ) -> Result<AdvHandle, RadioError>;

    /// Start transmitting on a context
    fn start_advertising(
        &mut self,
        handle: AdvHandle,
        request: &StartRequest<'_>,
    ) -> Result<(), RadioError>;

    /// Swap the payload of a context without interrupting transmission
    fn update_payload(&mut self, handle: AdvHandle, payload: &[u8]) -> Result<(), RadioError>;

    /// Stop transmitting on a context
    fn stop_advertising(&mut self, handle: AdvHandle);

    /// Request termination of a link
    fn disconnect(&mut self, conn: ConnHandle, reason: u8) -> Result<(), RadioError>;
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    /// A request observed by the mock radio
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RadioRequest {
        Create(AdvHandle),
        Start {
            handle: AdvHandle,
            duty: DutyCycle,
            directed_peer: Option<PeerAddress>,
            identity: Option<PeerAddress>,
            payload: Vec<u8>,
        },
        Update(AdvHandle, Vec<u8>),
        Stop(AdvHandle),
        Disconnect(ConnHandle, u8),
    }

    /// Recording radio for tests
    #[derive(Debug, Default)]
    pub struct MockRadio {
        pub requests: Vec<RadioRequest>,
        pub max_contexts: Option<usize>,
        contexts: usize,
        fail_next: Option<RadioError>,
    }

    impl MockRadio {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_max_contexts(max: usize) -> Self {
            Self {
                max_contexts: Some(max),
                ..Self::default()
            }
        }

        /// Fail the next fallible request with `err`
        pub fn fail_next(&mut self, err: RadioError) {
            self.fail_next = Some(err);
        }

        pub fn starts(&self) -> Vec<AdvHandle> {
            self.requests
                .iter()
                .filter_map(|r| match r {
                    RadioRequest::Start { handle, .. } => Some(*handle),
                    _ => None,
                })
                .collect()
        }

        pub fn last_start(&self) -> Option<&RadioRequest> {
            self.requests
                .iter()
                .rev()
                .find(|r| matches!(r, RadioRequest::Start { .. }))
        }

        pub fn clear(&mut self) {
            self.requests.clear();
        }
    }

    impl Radio for MockRadio {
        fn create_advertising_context(
            &mut self,
            _params: &AdvertisingParameters,
        ) -> Result<AdvHandle, RadioError> {
            if let Some(err) = self.fail_next.take() {
                return Err(err);
            }
            if let Some(max) = self.max_contexts {
                if self.contexts >= max {
                    return Err(RadioError::ResourceExhausted);
                }
            }

            let handle = AdvHandle(self.contexts as u8);
            self.contexts += 1;
            self.requests.push(RadioRequest::Create(handle));
            Ok(handle)
        }

        fn start_advertising(
            &mut self,
            handle: AdvHandle,
            request: &StartRequest<'_>,
        ) -> Result<(), RadioError> {
            if let Some(err) = self.fail_next.take() {
                return Err(err);
            }
            self.requests.push(RadioRequest::Start {
                handle,
                duty: request.duty,
                directed_peer: request.directed_peer,
                identity: request.identity,
                payload: request.payload.to_vec(),
            });
            Ok(())
        }

        fn update_payload(&mut self, handle: AdvHandle, payload: &[u8]) -> Result<(), RadioError> {
            if let Some(err) = self.fail_next.take() {
                return Err(err);
            }
            self.requests
                .push(RadioRequest::Update(handle, payload.to_vec()));
            Ok(())
        }

        fn stop_advertising(&mut self, handle: AdvHandle) {
            self.requests.push(RadioRequest::Stop(handle));
        }

        fn disconnect(&mut self, conn: ConnHandle, reason: u8) -> Result<(), RadioError> {
            if let Some(err) = self.fail_next.take() {
                return Err(err);
            }
            self.requests.push(RadioRequest::Disconnect(conn, reason));
            Ok(())
        }
    }
}
