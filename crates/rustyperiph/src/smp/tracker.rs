//! Security state tracking
//!
//! Watches security-level changes on live connections and refreshes the
//! bond of the connected peer.
//!
//! The first change reported for a connection is the result of the initial
//! pairing handshake and is treated as informational: the peer's identity
//! may not be resolved yet, so nothing is written. Every later change
//! rewrites the peer's record from scratch. Whether the bootstrap skip is
//! protocol-mandated or a workaround for one pairing sequence is not known;
//! it applies exactly to the first notification of each connection and
//! nothing else.

use super::keys::{KeyFlags, KeyRecord, KeyStore, KEY_SIZE, MAX_ENC_KEY_SIZE};
use super::types::{SecurityError, SecurityLevel};
use crate::error::{SessionError, SessionResult};
use crate::gap::PeerAddress;
use crate::radio::ConnHandle;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::HashMap;

/// What the tracker did with a security change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityOutcome {
    /// First change of the connection, no key store action
    Bootstrap,
    /// The peer's record was rewritten and read back
    KeysStored(KeyRecord),
    /// The change refers to a connection the tracker does not know
    UnknownConnection,
}

#[derive(Debug, Clone)]
struct SecuritySession {
    peer: PeerAddress,
    /// Set once the bootstrap notification has been seen
    bootstrapped: bool,
    level: SecurityLevel,
}

/// Per-connection security bookkeeping
pub struct SecurityTracker {
    sessions: HashMap<ConnHandle, SecuritySession>,
    cached_irk: Option<[u8; KEY_SIZE]>,
    rng: StdRng,
}

impl Default for SecurityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityTracker {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a tracker drawing key material from `rng`
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            sessions: HashMap::new(),
            cached_irk: None,
            rng,
        }
    }

    /// Start tracking a freshly established connection
    pub fn open(&mut self, conn: ConnHandle, peer: PeerAddress) {
        self.sessions.insert(
            conn,
            SecuritySession {
                peer,
                bootstrapped: false,
                level: SecurityLevel::None,
            },
        );
    }

    /// Stop tracking a connection
    pub fn close(&mut self, conn: ConnHandle) {
        self.sessions.remove(&conn);
    }

    pub fn level(&self, conn: ConnHandle) -> Option<SecurityLevel> {
        self.sessions.get(&conn).map(|s| s.level)
    }

    pub fn cached_irk(&self) -> Option<[u8; KEY_SIZE]> {
        self.cached_irk
    }

    /// Re-read the identity resolving key from the key store
    ///
    /// Records are visited in address order; the last record carrying an
    /// IRK wins. Records without one leave the cache untouched.
    pub fn refresh_identity_cache(&mut self, keys: &KeyStore) {
        let mut irk = self.cached_irk;
        keys.for_each(|record| {
            if let Some(ltk) = record.long_term_key {
                log::trace!("LTK iterator: {:02X}", ltk[0]);
            }
            if let Some(value) = record.identity_resolving_key {
                irk = Some(value);
            }
        });
        self.cached_irk = irk;
    }

    /// Handle a security level change on `conn`
    ///
    /// Returns `Err(KeyRecordNotFound)` when the record written cannot be
    /// read back; the caller must treat that as fatal for the session.
    pub fn security_changed(
        &mut self,
        conn: ConnHandle,
        level: SecurityLevel,
        error: Option<SecurityError>,
        keys: &mut KeyStore,
    ) -> SessionResult<SecurityOutcome> {
        let session = match self.sessions.get_mut(&conn) {
            Some(session) => session,
            None => {
                log::warn!("Security change on unknown connection {}", conn);
                return Ok(SecurityOutcome::UnknownConnection);
            }
        };

        match error {
            None => log::info!("Security changed: {} {}", session.peer, level),
            Some(err) => log::warn!(
                "Security failed: {} {} err {}",
                session.peer,
                level,
                err
            ),
        }
        session.level = level;

        if !session.bootstrapped {
            session.bootstrapped = true;
            return Ok(SecurityOutcome::Bootstrap);
        }

        let peer = session.peer;
        let record = self.synthesize(peer, level);

        // Remove the old record first so no stale field survives the rewrite
        if let Err(err) = keys.clear(&peer) {
            log::warn!("Could not clear bond of {} from storage: {}", peer, err);
        }
        if let Err(err) = keys.upsert(record) {
            log::warn!("Could not persist bond of {}: {}", peer, err);
        }
        log::info!("Storing keys for {}", peer);

        match keys.lookup(&peer) {
            Some(stored) => Ok(SecurityOutcome::KeysStored(stored)),
            None => {
                log::error!("Keys not found for {} after store", peer);
                Err(SessionError::KeyRecordNotFound(peer))
            }
        }
    }

    fn synthesize(&mut self, peer: PeerAddress, level: SecurityLevel) -> KeyRecord {
        let mut ltk = [0u8; KEY_SIZE];
        self.rng.fill_bytes(&mut ltk);

        let mut flags = KeyFlags::empty();
        if level.is_authenticated() {
            flags |= KeyFlags::AUTHENTICATED;
        }
        if level.is_secure_connections() {
            flags |= KeyFlags::SC;
        }

        let record = KeyRecord::new(peer)
            .with_ltk(ltk)
            .with_flags(flags)
            .with_enc_size(MAX_ENC_KEY_SIZE);

        match self.cached_irk {
            Some(irk) => record.with_irk(irk),
            None => record,
        }
    }
}
