//! Session event dispatcher
//!
//! All inbound events, whatever their origin, pass through one mpsc inbox
//! and are handled one at a time in arrival order. Re-arm timers are kept
//! by the controller and fire between events. Nothing here locks: the
//! dispatcher thread is the only one that touches session state.

use super::config::SessionConfig;
use super::controller::ConnectionController;
use super::event::{Outcome, SessionEvent, UserCommandKind};
use crate::error::{SessionError, SessionResult};
use crate::gap::{
    AdvertisingElement, AdvertisingParameters, AdvertisingRegistry, IdentityTable, PeerAddress,
    SetId,
};
use crate::radio::{AdvHandle, ConnHandle, Radio};
use crate::smp::{
    KeyRecord, KeyStore, SecurityError, SecurityLevel, SecurityOutcome, SecurityTracker,
};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SendError, Sender, TryRecvError};
use std::time::Instant;

/// Callbacks the lower layers use to report what happened
pub trait SessionObserver {
    fn link_connected(&self, adv: AdvHandle, conn: ConnHandle, peer: PeerAddress, status: u8);

    fn link_disconnected(&self, conn: ConnHandle, reason: u8);

    fn security_changed(
        &self,
        conn: ConnHandle,
        level: SecurityLevel,
        error: Option<SecurityError>,
    );

    fn user_command(&self, target: Option<SetId>, kind: UserCommandKind);
}

/// Cloneable handle feeding the dispatcher's inbox
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<SessionEvent>,
}

impl EventSender {
    pub fn send(&self, event: SessionEvent) -> Result<(), SendError<SessionEvent>> {
        self.tx.send(event)
    }

    fn forward(&self, event: SessionEvent) {
        if let Err(err) = self.send(event) {
            log::debug!("Dispatcher gone, dropping {:?}", err.0);
        }
    }
}

impl SessionObserver for EventSender {
    fn link_connected(&self, adv: AdvHandle, conn: ConnHandle, peer: PeerAddress, status: u8) {
        self.forward(SessionEvent::LinkConnected {
            adv,
            conn,
            peer,
            status,
        });
    }

    fn link_disconnected(&self, conn: ConnHandle, reason: u8) {
        self.forward(SessionEvent::LinkDisconnected { conn, reason });
    }

    fn security_changed(
        &self,
        conn: ConnHandle,
        level: SecurityLevel,
        error: Option<SecurityError>,
    ) {
        self.forward(SessionEvent::SecurityChanged { conn, level, error });
    }

    fn user_command(&self, target: Option<SetId>, kind: UserCommandKind) {
        self.forward(SessionEvent::UserCommand { target, kind });
    }
}

/// Every piece of state the handlers share
pub struct Session<R: Radio> {
    registry: AdvertisingRegistry<R>,
    keys: KeyStore,
    controller: ConnectionController,
    tracker: SecurityTracker,
    config: SessionConfig,
    fault: Option<SessionError>,
}

impl<R: Radio> Session<R> {
    /// Build a session around `radio`, with `identity` as identity slot 0
    pub fn new(radio: R, identity: PeerAddress, keys: KeyStore, config: SessionConfig) -> Self {
        Self::with_tracker(radio, identity, keys, config, SecurityTracker::new())
    }

    pub fn with_tracker(
        radio: R,
        identity: PeerAddress,
        keys: KeyStore,
        config: SessionConfig,
        mut tracker: SecurityTracker,
    ) -> Self {
        let registry = AdvertisingRegistry::new(
            radio,
            IdentityTable::new(identity, config.max_identities),
            config.device_name.clone(),
            config.max_advertising_sets,
            config.payload_limit(),
        );
        tracker.refresh_identity_cache(&keys);

        Self {
            registry,
            keys,
            controller: ConnectionController::new(&config),
            tracker,
            config,
            fault: None,
        }
    }

    pub fn registry(&self) -> &AdvertisingRegistry<R> {
        &self.registry
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    pub fn controller(&self) -> &ConnectionController {
        &self.controller
    }

    pub fn tracker(&self) -> &SecurityTracker {
        &self.tracker
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn radio(&self) -> &R {
        self.registry.radio()
    }

    pub fn radio_mut(&mut self) -> &mut R {
        self.registry.radio_mut()
    }

    /// The invariant violation that stopped the session, if any
    pub fn fault(&self) -> Option<&SessionError> {
        self.fault.as_ref()
    }

    fn check_running(&self) -> SessionResult<()> {
        match self.fault {
            Some(_) => Err(SessionError::SessionFaulted),
            None => Ok(()),
        }
    }

    fn handle(&mut self, event: SessionEvent, now: Instant) -> Vec<Outcome> {
        match event {
            SessionEvent::LinkConnected {
                adv,
                conn,
                peer,
                status,
            } => {
                let outcomes =
                    self.controller
                        .link_connected(&mut self.registry, adv, conn, peer, status, now);
                if outcomes
                    .iter()
                    .any(|o| matches!(o, Outcome::Connected { .. }))
                {
                    self.tracker.open(conn, peer);
                }
                outcomes
            }
            SessionEvent::LinkDisconnected { conn, reason } => {
                self.tracker.close(conn);
                self.tracker.refresh_identity_cache(&self.keys);
                self.controller.link_disconnected(conn, reason, now)
            }
            SessionEvent::SecurityChanged { conn, level, error } => {
                match self
                    .tracker
                    .security_changed(conn, level, error, &mut self.keys)
                {
                    Ok(SecurityOutcome::Bootstrap) => vec![Outcome::SecurityBootstrap { conn }],
                    Ok(SecurityOutcome::KeysStored(record)) => vec![Outcome::KeysStored(record)],
                    Ok(SecurityOutcome::UnknownConnection) => Vec::new(),
                    Err(err) if err.is_fatal() => vec![self.abort(err)],
                    Err(err) => {
                        log::warn!("Security change on {} not applied: {}", conn, err);
                        Vec::new()
                    }
                }
            }
            SessionEvent::UserCommand { target, kind } => {
                log::debug!("User command {:?} for {:?}", kind, target);
                self.controller
                    .user_command(&mut self.registry, target, kind, now)
            }
        }
    }

    /// Stop handling events after an invariant violation
    pub(crate) fn abort(&mut self, err: SessionError) -> Outcome {
        log::error!("Session aborted: {}", err);
        self.fault = Some(err.clone());
        Outcome::SessionFault(err)
    }
}

/// Serializes every event into the session
pub struct Dispatcher<R: Radio> {
    session: Session<R>,
    inbox: Receiver<SessionEvent>,
}

impl<R: Radio> Dispatcher<R> {
    /// Create a dispatcher and the first handle to its inbox
    pub fn new(session: Session<R>) -> (Self, EventSender) {
        let (tx, inbox) = mpsc::channel();
        (Self { session, inbox }, EventSender { tx })
    }

    pub fn session(&self) -> &Session<R> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<R> {
        &mut self.session
    }

    /// Create an advertising set in the `Idle` state
    pub fn create_set(
        &mut self,
        params: AdvertisingParameters,
        payload: Vec<AdvertisingElement>,
    ) -> SessionResult<SetId> {
        self.session.check_running()?;
        let connectable = params.connectable;
        let set = self.session.registry.create(params, payload)?;
        if connectable {
            self.session.controller.bind(set);
        }
        Ok(set)
    }

    /// Start a set now
    pub fn start_set(&mut self, set: SetId) -> SessionResult<Outcome> {
        self.session.check_running()?;
        self.session
            .controller
            .start(&mut self.session.registry, set)
    }

    /// Stop a set; a connectable set is not re-armed until started again
    pub fn stop_set(&mut self, set: SetId) -> SessionResult<Vec<Outcome>> {
        self.session.check_running()?;
        self.session.controller.stop(&mut self.session.registry, set)
    }

    pub fn set_payload(
        &mut self,
        set: SetId,
        elements: Vec<AdvertisingElement>,
    ) -> SessionResult<()> {
        self.session.check_running()?;
        self.session.registry.set_payload(set, elements)
    }

    /// Create a random static identity, returning its slot
    pub fn create_identity(&mut self) -> SessionResult<u8> {
        self.session.check_running()?;
        self.session
            .registry
            .identities_mut()
            .create_identity(&mut rand::thread_rng())
    }

    /// Forget the bond with `peer`
    pub fn unbond(&mut self, peer: &PeerAddress) -> SessionResult<Option<KeyRecord>> {
        self.session.check_running()?;
        let removed = self.session.keys.clear(peer)?;
        if removed.is_some() {
            log::info!("Unpaired {}", peer);
        }
        self.session.tracker.refresh_identity_cache(&self.session.keys);
        Ok(removed)
    }

    /// Handle a single event
    pub fn dispatch(&mut self, event: SessionEvent, now: Instant) -> Vec<Outcome> {
        if self.session.fault.is_some() {
            log::warn!("Session faulted, ignoring {:?}", event);
            return Vec::new();
        }
        self.session.handle(event, now)
    }

    /// Fire re-arm timers that are due at `now`
    pub fn poll_timers(&mut self, now: Instant) -> Vec<Outcome> {
        if self.session.fault.is_some() {
            return Vec::new();
        }
        self.session
            .controller
            .fire_due(&mut self.session.registry, now)
    }

    /// Deadline of the next pending timer
    pub fn next_deadline(&self) -> Option<Instant> {
        self.session.controller.next_deadline()
    }

    /// Handle every event already queued, then fire due timers
    pub fn process_pending(&mut self, now: Instant) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        loop {
            match self.inbox.try_recv() {
                Ok(event) => outcomes.extend(self.dispatch(event, now)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        outcomes.extend(self.poll_timers(now));
        outcomes
    }

    /// Run the session until every sender is gone or the session faults
    ///
    /// Pending re-arms still fire after the last sender is dropped.
    pub fn run<F>(&mut self, mut on_outcome: F) -> SessionResult<()>
    where
        F: FnMut(&Outcome),
    {
        let mut closed = false;

        loop {
            if let Some(err) = self.session.fault.clone() {
                return Err(err);
            }

            for outcome in self.poll_timers(Instant::now()) {
                on_outcome(&outcome);
            }

            let deadline = self.next_deadline();
            let event = match (deadline, closed) {
                (None, true) => return Ok(()),
                (Some(deadline), true) => {
                    std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                    continue;
                }
                (Some(deadline), false) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    match self.inbox.recv_timeout(timeout) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => {
                            closed = true;
                            continue;
                        }
                    }
                }
                (None, false) => match self.inbox.recv() {
                    Ok(event) => event,
                    Err(_) => {
                        closed = true;
                        continue;
                    }
                },
            };

            for outcome in self.dispatch(event, Instant::now()) {
                on_outcome(&outcome);
            }
        }
    }
}
