//! Event and outcome vocabulary of the session

use crate::error::SessionError;
use crate::gap::{DutyCycle, PeerAddress, SetId};
use crate::radio::{AdvHandle, ConnHandle};
use crate::smp::{KeyRecord, SecurityError, SecurityLevel};
use std::time::Instant;

/// Command delivered by the input layer, already debounced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommandKind {
    /// Terminate the live connection
    Disconnect,
    /// Re-arm with low duty directed advertising
    SetLowDutyAdvertising,
    /// Re-arm with high duty directed advertising
    SetHighDutyAdvertising,
    /// Start advertising and allow re-arming again
    StartAdvertising,
    /// Stop advertising and suppress re-arming
    StopAdvertising,
}

/// Inbound event, consumed exactly once by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A connection attempt on an advertising context completed
    ///
    /// A non-zero `status` means the attempt failed and no link exists.
    LinkConnected {
        adv: AdvHandle,
        conn: ConnHandle,
        peer: PeerAddress,
        status: u8,
    },
    /// A link went away
    LinkDisconnected { conn: ConnHandle, reason: u8 },
    /// The security level of a link changed
    SecurityChanged {
        conn: ConnHandle,
        level: SecurityLevel,
        error: Option<SecurityError>,
    },
    /// User command; `None` targets every connectable set
    UserCommand {
        target: Option<SetId>,
        kind: UserCommandKind,
    },
}

/// Observable result of handling an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    AdvertisingStarted { set: SetId, duty: DutyCycle },
    AdvertisingStopped(SetId),
    /// An automatic or commanded start was refused
    StartFailed { set: SetId, error: SessionError },
    Connected {
        set: SetId,
        conn: ConnHandle,
        peer: PeerAddress,
    },
    /// A connect event carried a failure status
    ConnectionFailed { set: SetId, status: u8 },
    Disconnected {
        set: SetId,
        conn: ConnHandle,
        reason: u8,
    },
    DisconnectRequested { set: SetId, conn: ConnHandle },
    DutyChanged { set: SetId, duty: DutyCycle },
    RearmScheduled { set: SetId, deadline: Instant },
    RearmCancelled(SetId),
    /// First security change of a connection, no keys written
    SecurityBootstrap { conn: ConnHandle },
    KeysStored(KeyRecord),
    /// A user command could not be applied
    CommandFailed(SessionError),
    /// The session hit an invariant violation and stopped
    SessionFault(SessionError),
}
