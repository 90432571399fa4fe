//! Unit tests for the key store and the security tracker

use super::*;
use crate::error::{SessionError, StorageError};
use crate::gap::PeerAddress;
use crate::radio::ConnHandle;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};

fn peer(last: u8) -> PeerAddress {
    PeerAddress::random([0x11, 0x22, 0x33, 0x44, 0x55, last])
}

fn tracker() -> SecurityTracker {
    SecurityTracker::with_rng(StdRng::seed_from_u64(42))
}

/// Storage that counts writes and can be switched into a failing mode
#[derive(Clone, Default)]
struct SharedStorage {
    inner: Arc<Mutex<SharedState>>,
}

#[derive(Default)]
struct SharedState {
    records: MemoryBondStorage,
    persists: usize,
    removes: usize,
    failing: bool,
}

impl SharedStorage {
    fn persists(&self) -> usize {
        self.inner.lock().unwrap().persists
    }

    fn removes(&self) -> usize {
        self.inner.lock().unwrap().removes
    }

    fn set_failing(&self, failing: bool) {
        self.inner.lock().unwrap().failing = failing;
    }

    fn stored(&self, peer: &PeerAddress) -> Option<KeyRecord> {
        self.inner.lock().unwrap().records.get(peer).cloned()
    }
}

impl BondStorage for SharedStorage {
    fn load_all_keys(&self) -> Result<Vec<KeyRecord>, StorageError> {
        self.inner.lock().unwrap().records.load_all_keys()
    }

    fn persist(&mut self, record: &KeyRecord) -> Result<(), StorageError> {
        let mut state = self.inner.lock().unwrap();
        if state.failing {
            return Err(StorageError::Unavailable("flash busy".into()));
        }
        state.persists += 1;
        state.records.persist(record)
    }

    fn remove(&mut self, peer: &PeerAddress) -> Result<(), StorageError> {
        let mut state = self.inner.lock().unwrap();
        if state.failing {
            return Err(StorageError::Unavailable("flash busy".into()));
        }
        state.removes += 1;
        state.records.remove(peer)
    }
}

#[test]
fn test_upsert_replaces_whole_record() {
    let mut store = KeyStore::new();
    let p = peer(1);

    store
        .upsert(
            KeyRecord::new(p)
                .with_ltk([1; KEY_SIZE])
                .with_irk([2; KEY_SIZE])
                .with_flags(KeyFlags::AUTHENTICATED | KeyFlags::SC)
                .with_enc_size(16),
        )
        .unwrap();

    store.upsert(KeyRecord::new(p).with_ltk([9; KEY_SIZE])).unwrap();

    let stored = store.lookup(&p).unwrap();
    assert_eq!(stored.long_term_key, Some([9; KEY_SIZE]));
    assert_eq!(stored.identity_resolving_key, None);
    assert_eq!(stored.flags, KeyFlags::empty());
    assert_eq!(stored.enc_size, 0);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_lookup_and_clear() {
    let mut store = KeyStore::new();
    let p = peer(1);

    assert!(store.lookup(&p).is_none());
    assert_eq!(store.clear(&p), Ok(None));

    store.upsert(KeyRecord::new(p).with_irk([3; KEY_SIZE])).unwrap();
    assert!(store.contains(&p));

    let removed = store.clear(&p).unwrap();
    assert_eq!(removed.map(|r| r.peer), Some(p));
    assert!(store.is_empty());
}

#[test]
fn test_snapshot_is_isolated_and_restartable() {
    let mut store = KeyStore::new();
    store.upsert(KeyRecord::new(peer(1))).unwrap();
    store.upsert(KeyRecord::new(peer(2))).unwrap();

    let snapshot = store.snapshot();
    store.clear(&peer(1)).unwrap();
    store.upsert(KeyRecord::new(peer(3))).unwrap();

    let first: Vec<_> = snapshot.iter().map(|r| r.peer).collect();
    let second: Vec<_> = snapshot.iter().map(|r| r.peer).collect();
    assert_eq!(first, vec![peer(1), peer(2)]);
    assert_eq!(first, second);

    let mut visited = Vec::new();
    store.for_each(|r| visited.push(r.peer));
    assert_eq!(visited, vec![peer(2), peer(3)]);
}

#[test]
fn test_store_mirrors_storage() {
    let existing = KeyRecord::new(peer(7)).with_ltk([7; KEY_SIZE]);
    let storage = SharedStorage::default();
    storage
        .inner
        .lock()
        .unwrap()
        .records
        .persist(&existing)
        .unwrap();

    let mut store = KeyStore::with_storage(Box::new(storage.clone())).unwrap();
    assert_eq!(store.lookup(&peer(7)), Some(existing));

    store.upsert(KeyRecord::new(peer(8)).with_ltk([8; KEY_SIZE])).unwrap();
    assert_eq!(storage.persists(), 1);
    assert!(storage.stored(&peer(8)).is_some());

    store.clear(&peer(7)).unwrap();
    assert_eq!(storage.removes(), 1);
    assert!(storage.stored(&peer(7)).is_none());

    // Clearing an unknown peer does not reach the backend
    store.clear(&peer(7)).unwrap();
    assert_eq!(storage.removes(), 1);
}

#[test]
fn test_storage_failure_keeps_memory_copy() {
    let storage = SharedStorage::default();
    let mut store = KeyStore::with_storage(Box::new(storage.clone())).unwrap();

    storage.set_failing(true);
    let result = store.upsert(KeyRecord::new(peer(1)).with_ltk([1; KEY_SIZE]));
    assert!(matches!(result, Err(SessionError::Storage(_))));
    assert!(store.lookup(&peer(1)).is_some());
}

#[test]
fn test_first_security_change_is_bootstrap() {
    let storage = SharedStorage::default();
    let mut store = KeyStore::with_storage(Box::new(storage.clone())).unwrap();
    let mut tracker = tracker();
    let conn = ConnHandle(0x0040);

    tracker.open(conn, peer(1));
    let outcome = tracker
        .security_changed(conn, SecurityLevel::EncryptionOnly, None, &mut store)
        .unwrap();

    assert_eq!(outcome, SecurityOutcome::Bootstrap);
    assert_eq!(storage.persists(), 0);
    assert!(store.is_empty());
    assert_eq!(tracker.level(conn), Some(SecurityLevel::EncryptionOnly));
}

#[test]
fn test_later_security_changes_write_once_each() {
    let storage = SharedStorage::default();
    let mut store = KeyStore::with_storage(Box::new(storage.clone())).unwrap();
    let mut tracker = tracker();
    let conn = ConnHandle(0x0040);
    tracker.open(conn, peer(1));

    tracker
        .security_changed(conn, SecurityLevel::EncryptionOnly, None, &mut store)
        .unwrap();

    for expected in 1..=3 {
        let outcome = tracker
            .security_changed(conn, SecurityLevel::SecureConnections, None, &mut store)
            .unwrap();
        match outcome {
            SecurityOutcome::KeysStored(record) => {
                assert_eq!(record.peer, peer(1));
                assert!(record.long_term_key.is_some());
                assert_eq!(record.flags, KeyFlags::AUTHENTICATED | KeyFlags::SC);
                assert_eq!(record.enc_size, MAX_ENC_KEY_SIZE);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(storage.persists(), expected);
    }
    assert_eq!(store.len(), 1);
}

#[test]
fn test_failed_security_change_still_refreshes() {
    let mut store = KeyStore::new();
    let mut tracker = tracker();
    let conn = ConnHandle(1);
    tracker.open(conn, peer(1));

    let first = tracker
        .security_changed(
            conn,
            SecurityLevel::None,
            Some(SecurityError::from_reason(0x05)),
            &mut store,
        )
        .unwrap();
    assert_eq!(first, SecurityOutcome::Bootstrap);

    let second = tracker
        .security_changed(
            conn,
            SecurityLevel::EncryptionOnly,
            Some(SecurityError::PairingNotSupported),
            &mut store,
        )
        .unwrap();
    assert!(matches!(second, SecurityOutcome::KeysStored(_)));
}

#[test]
fn test_bootstrap_flag_is_per_connection() {
    let mut store = KeyStore::new();
    let mut tracker = tracker();

    tracker.open(ConnHandle(1), peer(1));
    tracker
        .security_changed(ConnHandle(1), SecurityLevel::EncryptionOnly, None, &mut store)
        .unwrap();
    tracker.close(ConnHandle(1));

    tracker.open(ConnHandle(2), peer(1));
    let outcome = tracker
        .security_changed(ConnHandle(2), SecurityLevel::EncryptionOnly, None, &mut store)
        .unwrap();
    assert_eq!(outcome, SecurityOutcome::Bootstrap);
    assert!(store.is_empty());
}

#[test]
fn test_unknown_connection() {
    let mut store = KeyStore::new();
    let mut tracker = tracker();

    let outcome = tracker
        .security_changed(ConnHandle(5), SecurityLevel::EncryptionOnly, None, &mut store)
        .unwrap();
    assert_eq!(outcome, SecurityOutcome::UnknownConnection);
}

#[test]
fn test_synthesized_record_uses_cached_irk() {
    let mut store = KeyStore::new();
    store.upsert(KeyRecord::new(peer(1)).with_irk([0xA1; KEY_SIZE])).unwrap();
    store.upsert(KeyRecord::new(peer(2)).with_irk([0xB2; KEY_SIZE])).unwrap();
    store.upsert(KeyRecord::new(peer(3)).with_ltk([0xC3; KEY_SIZE])).unwrap();

    let mut tracker = tracker();
    tracker.refresh_identity_cache(&store);
    assert_eq!(tracker.cached_irk(), Some([0xB2; KEY_SIZE]));

    let conn = ConnHandle(3);
    tracker.open(conn, peer(3));
    tracker
        .security_changed(conn, SecurityLevel::EncryptionOnly, None, &mut store)
        .unwrap();
    tracker
        .security_changed(conn, SecurityLevel::EncryptionOnly, None, &mut store)
        .unwrap();

    let stored = store.lookup(&peer(3)).unwrap();
    assert_eq!(stored.identity_resolving_key, Some([0xB2; KEY_SIZE]));
    assert_ne!(stored.long_term_key, Some([0xC3; KEY_SIZE]));
    assert_eq!(stored.flags, KeyFlags::empty());
}

#[test]
fn test_security_level_ordering() {
    assert!(SecurityLevel::SecureConnections.is_authenticated());
    assert!(!SecurityLevel::EncryptionOnly.is_authenticated());
    assert!(!SecurityLevel::None.is_encrypted());
    assert_eq!(SecurityLevel::from_u8(2), Some(SecurityLevel::EncryptionOnly));
    assert_eq!(SecurityLevel::from_u8(9), None);
    assert_eq!(SecurityError::from_reason(0x42), SecurityError::Other(0x42));
}
