//! Bonding key storage
//!
//! [`KeyStore`] is the in-memory mirror of every bond the device holds. It is
//! only touched from dispatcher-serialized handlers and carries no locking of
//! its own. A [`BondStorage`] backend, when attached, receives every change.

use crate::error::{SessionResult, StorageError};
use crate::gap::PeerAddress;
use bitflags::bitflags;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Size of LTK and IRK values
pub const KEY_SIZE: usize = 16;

/// Maximum encryption key size
pub const MAX_ENC_KEY_SIZE: u8 = 16;

bitflags! {
    /// Properties of a stored bond
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KeyFlags: u8 {
        /// Keys were generated with MITM protection
        const AUTHENTICATED = 0x01;
        /// Keys were generated with debug keys
        const DEBUG = 0x02;
        /// Keys were generated with LE Secure Connections
        const SC = 0x10;
    }
}

/// Bonding key material for one peer
#[derive(Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub peer: PeerAddress,
    /// Long Term Key
    pub long_term_key: Option<[u8; KEY_SIZE]>,
    /// Identity Resolving Key
    pub identity_resolving_key: Option<[u8; KEY_SIZE]>,
    pub flags: KeyFlags,
    /// Encryption key size in octets
    pub enc_size: u8,
}

impl KeyRecord {
    /// Create an empty record for `peer`
    pub fn new(peer: PeerAddress) -> Self {
        Self {
            peer,
            long_term_key: None,
            identity_resolving_key: None,
            flags: KeyFlags::empty(),
            enc_size: 0,
        }
    }

    pub fn with_ltk(mut self, ltk: [u8; KEY_SIZE]) -> Self {
        self.long_term_key = Some(ltk);
        self
    }

    pub fn with_irk(mut self, irk: [u8; KEY_SIZE]) -> Self {
        self.identity_resolving_key = Some(irk);
        self
    }

    pub fn with_flags(mut self, flags: KeyFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_enc_size(mut self, enc_size: u8) -> Self {
        self.enc_size = enc_size;
        self
    }

    pub fn has_keys(&self) -> bool {
        self.long_term_key.is_some() || self.identity_resolving_key.is_some()
    }
}

// Key values stay out of debug output; only their presence is shown
impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("peer", &self.peer)
            .field("ltk", &self.long_term_key.is_some())
            .field("irk", &self.identity_resolving_key.is_some())
            .field("flags", &self.flags)
            .field("enc_size", &self.enc_size)
            .finish()
    }
}

/// Persistence backend for bonds
pub trait BondStorage {
    /// Load every stored bond
    fn load_all_keys(&self) -> Result<Vec<KeyRecord>, StorageError>;

    /// Store a bond, replacing any existing one for the same peer
    fn persist(&mut self, record: &KeyRecord) -> Result<(), StorageError>;

    /// Delete the bond for a peer
    fn remove(&mut self, peer: &PeerAddress) -> Result<(), StorageError>;
}

/// Storage handle owned by a key store
pub type BondStorageHandle = Box<dyn BondStorage + Send>;

/// In-memory implementation of BondStorage
#[derive(Debug, Default, Clone)]
pub struct MemoryBondStorage {
    records: HashMap<PeerAddress, KeyRecord>,
}

impl MemoryBondStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a storage pre-populated with `records`
    pub fn with_records(records: impl IntoIterator<Item = KeyRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.peer, r)).collect(),
        }
    }

    pub fn get(&self, peer: &PeerAddress) -> Option<&KeyRecord> {
        self.records.get(peer)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl BondStorage for MemoryBondStorage {
    fn load_all_keys(&self) -> Result<Vec<KeyRecord>, StorageError> {
        Ok(self.records.values().cloned().collect())
    }

    fn persist(&mut self, record: &KeyRecord) -> Result<(), StorageError> {
        self.records.insert(record.peer, record.clone());
        Ok(())
    }

    fn remove(&mut self, peer: &PeerAddress) -> Result<(), StorageError> {
        self.records.remove(peer);
        Ok(())
    }
}

/// Snapshot of the key store taken at traversal time
///
/// Later store mutations do not affect it; `iter` can be called any number
/// of times.
#[derive(Debug, Clone)]
pub struct KeySnapshot {
    records: Vec<KeyRecord>,
}

impl KeySnapshot {
    pub fn iter(&self) -> impl Iterator<Item = &KeyRecord> + '_ {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// In-memory bond table keyed by peer address
#[derive(Default)]
pub struct KeyStore {
    records: BTreeMap<PeerAddress, KeyRecord>,
    storage: Option<BondStorageHandle>,
}

impl KeyStore {
    /// Create an empty store with no persistence
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store mirroring `storage`, loading every persisted bond
    pub fn with_storage(storage: BondStorageHandle) -> Result<Self, StorageError> {
        let records = storage
            .load_all_keys()?
            .into_iter()
            .map(|r| (r.peer, r))
            .collect::<BTreeMap<_, _>>();

        log::info!("Loaded {} bond(s) from storage", records.len());

        Ok(Self {
            records,
            storage: Some(storage),
        })
    }

    /// Replace the record for `record.peer` entirely
    ///
    /// The in-memory copy is always updated; an `Err` only reports that the
    /// storage backend did not accept the change.
    pub fn upsert(&mut self, record: KeyRecord) -> SessionResult<()> {
        let peer = record.peer;
        self.records.remove(&peer);
        self.records.insert(peer, record);

        if let (Some(storage), Some(stored)) = (self.storage.as_mut(), self.records.get(&peer)) {
            storage.persist(stored)?;
        }

        Ok(())
    }

    pub fn lookup(&self, peer: &PeerAddress) -> Option<KeyRecord> {
        self.records.get(peer).cloned()
    }

    pub fn contains(&self, peer: &PeerAddress) -> bool {
        self.records.contains_key(peer)
    }

    /// Remove the record for `peer`, returning it if one existed
    pub fn clear(&mut self, peer: &PeerAddress) -> SessionResult<Option<KeyRecord>> {
        let removed = self.records.remove(peer);

        if removed.is_some() {
            if let Some(storage) = self.storage.as_mut() {
                storage.remove(peer)?;
            }
        }

        Ok(removed)
    }

    /// Take a traversal snapshot of every record
    pub fn snapshot(&self) -> KeySnapshot {
        KeySnapshot {
            records: self.records.values().cloned().collect(),
        }
    }

    /// Visit every record present at call time
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&KeyRecord),
    {
        for record in self.snapshot().iter() {
            visitor(record);
        }
    }

    pub fn peers(&self) -> Vec<PeerAddress> {
        self.records.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
