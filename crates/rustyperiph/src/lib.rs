//! RustyPeriph - A Rust library for running a Bluetooth LE peripheral
//!
//! This library orchestrates the peripheral role on top of a link layer it
//! does not own: it creates and runs advertising sets, accepts incoming
//! connections, re-arms advertising after a link goes away and keeps bonding
//! keys fresh across the connection lifecycle. Every external event is
//! serialized through a single dispatcher.

pub mod error;
pub mod gap;
pub mod radio;
pub mod services;
pub mod session;
pub mod smp;

// Re-export common types for convenience
pub use error::{SessionError, SessionResult, StorageError};
pub use gap::{
    AdFlags, AdvertisingElement, AdvertisingParameters, AdvertisingRegistry, DutyCycle,
    IdentityTable, PeerAddress, SetId, SetState,
};
pub use radio::{AdvHandle, ConnHandle, Radio, RadioError, StartRequest};
pub use services::{
    BatterySimulator, GattNotifier, HeartRateSimulator, PeriodicNotifier, ServiceSimulator,
};
pub use session::{
    Dispatcher, EventSender, Outcome, Session, SessionConfig, SessionEvent, SessionObserver,
    UserCommandKind,
};
pub use smp::{BondStorage, KeyRecord, KeyStore, MemoryBondStorage, SecurityLevel};
