use crate::error::{SessionError, SessionResult};
use crate::gap::constants::*;
use rand::RngCore;
use std::fmt;
use std::str::FromStr;

/// Handle of an advertising set, unique and stable for the set's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SetId(pub u8);

impl fmt::Display for SetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressKind {
    Public,
    Random,
}

impl From<u8> for AddressKind {
    fn from(value: u8) -> Self {
        match value {
            RANDOM_DEVICE_ADDRESS => AddressKind::Random,
            _ => AddressKind::Public,
        }
    }
}

impl From<AddressKind> for u8 {
    fn from(value: AddressKind) -> Self {
        match value {
            AddressKind::Public => PUBLIC_DEVICE_ADDRESS,
            AddressKind::Random => RANDOM_DEVICE_ADDRESS,
        }
    }
}

/// LE device address, little-endian byte order as carried over the air
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddress {
    pub kind: AddressKind,
    pub bytes: [u8; 6],
}

impl PeerAddress {
    pub fn new(kind: AddressKind, bytes: [u8; 6]) -> Self {
        Self { kind, bytes }
    }

    pub fn public(bytes: [u8; 6]) -> Self {
        Self::new(AddressKind::Public, bytes)
    }

    pub fn random(bytes: [u8; 6]) -> Self {
        Self::new(AddressKind::Random, bytes)
    }

    /// Generate a random static address (two most significant bits set)
    pub fn random_static<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 6];
        rng.fill_bytes(&mut bytes);
        bytes[5] |= 0xC0;
        Self::random(bytes)
    }

    pub fn is_random_static(&self) -> bool {
        self.kind == AddressKind::Random && self.bytes[5] & 0xC0 == 0xC0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            AddressKind::Public => "public",
            AddressKind::Random => "random",
        };
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X} ({})",
            self.bytes[5],
            self.bytes[4],
            self.bytes[3],
            self.bytes[2],
            self.bytes[1],
            self.bytes[0],
            kind
        )
    }
}

/// Parses `AA:BB:CC:DD:EE:FF` (most significant byte first), optionally
/// followed by ` (public)` or ` (random)`. Defaults to a public address.
impl FromStr for PeerAddress {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SessionError::InvalidParameters(format!("bad address '{}'", s));

        let (addr, kind) = match s.trim().split_once(' ') {
            Some((addr, "(random)")) => (addr, AddressKind::Random),
            Some((addr, "(public)")) => (addr, AddressKind::Public),
            Some(_) => return Err(invalid()),
            None => (s.trim(), AddressKind::Public),
        };

        let digits: String = addr.split(':').collect();
        if digits.len() != 12 || addr.split(':').count() != 6 {
            return Err(invalid());
        }

        let mut bytes = [0u8; 6];
        hex::decode_to_slice(&digits, &mut bytes).map_err(|_| invalid())?;
        bytes.reverse();

        Ok(Self::new(kind, bytes))
    }
}

/// Duty cycle of directed advertising
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DutyCycle {
    #[default]
    Low,
    High,
}

impl fmt::Display for DutyCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DutyCycle::Low => write!(f, "low duty"),
            DutyCycle::High => write!(f, "high duty"),
        }
    }
}

/// Local identity addresses, indexed by identity slot
#[derive(Debug, Clone)]
pub struct IdentityTable {
    identities: Vec<PeerAddress>,
    max: usize,
}

impl IdentityTable {
    /// Create a table whose slot 0 is the controller's default identity
    pub fn new(default_identity: PeerAddress, max: usize) -> Self {
        Self {
            identities: vec![default_identity],
            max: max.max(1),
        }
    }

    /// Create a new random static identity, returning its slot
    pub fn create_identity<R: RngCore + ?Sized>(&mut self, rng: &mut R) -> SessionResult<u8> {
        if self.identities.len() >= self.max {
            return Err(SessionError::ResourceExhausted);
        }

        let mut addr = PeerAddress::random_static(rng);
        while self.identities.contains(&addr) {
            addr = PeerAddress::random_static(rng);
        }

        self.identities.push(addr);
        let slot = (self.identities.len() - 1) as u8;
        log::info!("Identity {}: {}", slot, addr);
        Ok(slot)
    }

    pub fn get(&self, slot: u8) -> Option<&PeerAddress> {
        self.identities.get(slot as usize)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerAddress> {
        self.identities.iter()
    }
}
