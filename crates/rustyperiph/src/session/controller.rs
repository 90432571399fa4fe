//! Connection lifecycle controller
//!
//! Tracks one binding per connectable advertising set:
//!
//! ```text
//! Idle -> Advertising -> Connected -> Disconnecting -> Idle
//! ```
//!
//! Every path back to `Idle` that is caused by the link going away (a
//! disconnect or a failed connection attempt) schedules a re-arm of the set
//! after the settle delay, unless the last user command suppressed it.

use super::config::SessionConfig;
use super::event::{Outcome, UserCommandKind};
use super::timer::{TimerId, TimerQueue};
use crate::error::{SessionError, SessionResult};
use crate::gap::{AdvertisingRegistry, DutyCycle, PeerAddress, SetId, SetState, HCI_SUCCESS};
use crate::radio::{AdvHandle, ConnHandle, Radio};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Idle,
    Advertising,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Directed advertising is waiting for its peer
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

/// A link formed from an advertising set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Link handle, known once the link exists
    pub handle: Option<ConnHandle>,
    pub peer: PeerAddress,
    pub originating_set: SetId,
    pub state: ConnectionState,
}

impl Connection {
    /// Whether a link exists that blocks re-arming the originating set
    pub fn is_live(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Disconnecting
        )
    }
}

/// Lifecycle state of one connectable advertising set
#[derive(Debug, Clone)]
pub struct Binding {
    state: BindingState,
    connection: Option<Connection>,
    duty: DutyCycle,
    suppressed: bool,
    rearm: Option<TimerId>,
}

impl Binding {
    pub fn state(&self) -> BindingState {
        self.state
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn duty(&self) -> DutyCycle {
        self.duty
    }

    /// Whether re-arming was suppressed by a stop command
    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn has_pending_rearm(&self) -> bool {
        self.rearm.is_some()
    }

    fn has_live_connection(&self) -> bool {
        self.connection.as_ref().map_or(false, Connection::is_live)
    }
}

pub struct ConnectionController {
    bindings: BTreeMap<SetId, Binding>,
    timers: TimerQueue<SetId>,
    settle_delay: Duration,
    default_duty: DutyCycle,
    disconnect_reason: u8,
}

impl ConnectionController {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            bindings: BTreeMap::new(),
            timers: TimerQueue::new(),
            settle_delay: config.settle_delay,
            default_duty: config.default_duty,
            disconnect_reason: config.disconnect_reason,
        }
    }

    /// Track a connectable set
    pub fn bind(&mut self, set: SetId) {
        self.bindings.entry(set).or_insert(Binding {
            state: BindingState::Idle,
            connection: None,
            duty: self.default_duty,
            suppressed: false,
            rearm: None,
        });
    }

    pub fn binding(&self, set: SetId) -> Option<&Binding> {
        self.bindings.get(&set)
    }

    pub fn connection(&self, set: SetId) -> Option<&Connection> {
        self.bindings.get(&set).and_then(Binding::connection)
    }

    /// Every connection record currently held
    pub fn connections(&self) -> impl Iterator<Item = &Connection> + '_ {
        self.bindings.values().filter_map(Binding::connection)
    }

    /// Find the set owning link `conn`
    pub fn set_for_connection(&self, conn: ConnHandle) -> Option<SetId> {
        self.bindings
            .iter()
            .find(|(_, binding)| {
                binding
                    .connection
                    .as_ref()
                    .map_or(false, |c| c.handle == Some(conn))
            })
            .map(|(set, _)| *set)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Explicitly start a set
    pub fn start<R: Radio>(
        &mut self,
        registry: &mut AdvertisingRegistry<R>,
        set: SetId,
    ) -> SessionResult<Outcome> {
        let binding = match self.bindings.get_mut(&set) {
            Some(binding) => binding,
            None => {
                registry.start(set, self.default_duty)?;
                return Ok(Outcome::AdvertisingStarted {
                    set,
                    duty: self.default_duty,
                });
            }
        };

        if binding.has_live_connection() {
            return Err(SessionError::InvalidState(format!(
                "set {} still has a live connection",
                set
            )));
        }
        if binding.state != BindingState::Idle {
            return Err(SessionError::AlreadyRunning(set));
        }

        binding.suppressed = false;
        self.cancel_rearm(set);
        self.arm(registry, set)
    }

    /// Explicitly stop a set and suppress its re-arming
    pub fn stop<R: Radio>(
        &mut self,
        registry: &mut AdvertisingRegistry<R>,
        set: SetId,
    ) -> SessionResult<Vec<Outcome>> {
        let mut outcomes = Vec::new();

        let binding = match self.bindings.get_mut(&set) {
            Some(binding) => binding,
            None => {
                let was_running = registry.state(set) == Some(SetState::Running);
                registry.stop(set)?;
                if was_running {
                    outcomes.push(Outcome::AdvertisingStopped(set));
                }
                return Ok(outcomes);
            }
        };

        binding.suppressed = true;
        if self.cancel_rearm(set) {
            outcomes.push(Outcome::RearmCancelled(set));
        }

        if let Some(binding) = self.bindings.get_mut(&set) {
            if binding.state == BindingState::Advertising {
                registry.stop(set)?;
                binding.state = BindingState::Idle;
                if binding
                    .connection
                    .as_ref()
                    .map_or(false, |c| c.state == ConnectionState::Connecting)
                {
                    binding.connection = None;
                }
                outcomes.push(Outcome::AdvertisingStopped(set));
            }
        }

        Ok(outcomes)
    }

    /// Handle completion of a connection attempt
    pub fn link_connected<R: Radio>(
        &mut self,
        registry: &mut AdvertisingRegistry<R>,
        adv: AdvHandle,
        conn: ConnHandle,
        peer: PeerAddress,
        status: u8,
        now: Instant,
    ) -> Vec<Outcome> {
        let set = match registry.set_for_handle(adv) {
            Some(set) => set,
            None => {
                log::warn!("Connection reported on unknown advertising context {}", adv.0);
                return Vec::new();
            }
        };
        if !self.bindings.contains_key(&set) {
            log::warn!("Connection reported on non-connectable set {}", set);
            return Vec::new();
        }

        if status != HCI_SUCCESS {
            // A failed attempt cannot end a link that is already up
            if self
                .bindings
                .get(&set)
                .map_or(false, Binding::has_live_connection)
            {
                log::warn!(
                    "Ignoring failed connection on set {} (err 0x{:02x}), link still up",
                    set,
                    status
                );
                return Vec::new();
            }

            log::warn!("Connection failed (err 0x{:02x})", status);
            registry.mark_released(set);
            if let Some(binding) = self.bindings.get_mut(&set) {
                binding.connection = None;
                binding.state = BindingState::Idle;
            }

            let mut outcomes = vec![Outcome::ConnectionFailed { set, status }];
            outcomes.extend(self.schedule_rearm(set, now));
            return outcomes;
        }

        let reason = self.disconnect_reason;
        if let Some(binding) = self.bindings.get_mut(&set) {
            if binding.has_live_connection() {
                log::warn!(
                    "Set {} already holds a connection, rejecting {} from {}",
                    set,
                    conn,
                    peer
                );
                if let Err(err) = registry.disconnect(conn, reason) {
                    log::warn!("Disconnect failed (err {})", err);
                }
                return Vec::new();
            }

            registry.mark_released(set);
            binding.connection = Some(Connection {
                handle: Some(conn),
                peer,
                originating_set: set,
                state: ConnectionState::Connected,
            });
            binding.state = BindingState::Connected;
        }
        self.cancel_rearm(set);

        log::info!("Connected {}", peer);
        vec![Outcome::Connected { set, conn, peer }]
    }

    /// Handle the end of a link
    pub fn link_disconnected(&mut self, conn: ConnHandle, reason: u8, now: Instant) -> Vec<Outcome> {
        let set = match self.set_for_connection(conn) {
            Some(set) => set,
            None => {
                log::debug!("Disconnect for untracked connection {}", conn);
                return Vec::new();
            }
        };

        if let Some(binding) = self.bindings.get_mut(&set) {
            if let Some(connection) = binding.connection.take() {
                log::info!(
                    "Disconnected from {} (reason 0x{:02x})",
                    connection.peer,
                    reason
                );
            }
            binding.state = BindingState::Idle;
        }

        let mut outcomes = vec![Outcome::Disconnected { set, conn, reason }];
        outcomes.extend(self.schedule_rearm(set, now));
        outcomes
    }

    /// Apply a user command to one set or to every connectable set
    pub fn user_command<R: Radio>(
        &mut self,
        registry: &mut AdvertisingRegistry<R>,
        target: Option<SetId>,
        kind: UserCommandKind,
        now: Instant,
    ) -> Vec<Outcome> {
        let sets: Vec<SetId> = match target {
            Some(set) if self.bindings.contains_key(&set) => vec![set],
            Some(set) if registry.get(set).is_some() => {
                return vec![Outcome::CommandFailed(SessionError::InvalidState(format!(
                    "set {} is not connectable",
                    set
                )))];
            }
            Some(set) => return vec![Outcome::CommandFailed(SessionError::UnknownSet(set))],
            None => self.bindings.keys().copied().collect(),
        };

        let mut outcomes = Vec::new();
        for set in sets {
            match kind {
                UserCommandKind::Disconnect => self.request_disconnect(registry, set, &mut outcomes),
                UserCommandKind::SetLowDutyAdvertising => {
                    self.change_duty(set, DutyCycle::Low, now, &mut outcomes)
                }
                UserCommandKind::SetHighDutyAdvertising => {
                    self.change_duty(set, DutyCycle::High, now, &mut outcomes)
                }
                UserCommandKind::StartAdvertising => {
                    self.resume(registry, set, &mut outcomes)
                }
                UserCommandKind::StopAdvertising => match self.stop(registry, set) {
                    Ok(stopped) => outcomes.extend(stopped),
                    Err(err) => outcomes.push(Outcome::CommandFailed(err)),
                },
            }
        }
        outcomes
    }

    /// Fire every re-arm whose settle delay has elapsed
    pub fn fire_due<R: Radio>(
        &mut self,
        registry: &mut AdvertisingRegistry<R>,
        now: Instant,
    ) -> Vec<Outcome> {
        let mut outcomes = Vec::new();

        while let Some((id, set)) = self.timers.pop_due(now) {
            let binding = match self.bindings.get_mut(&set) {
                Some(binding) => binding,
                None => continue,
            };
            if binding.rearm == Some(id) {
                binding.rearm = None;
            }

            if binding.suppressed
                || binding.state != BindingState::Idle
                || binding.has_live_connection()
            {
                log::debug!("Re-arm of set {} dropped", set);
                continue;
            }

            match self.arm(registry, set) {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) => {
                    log::warn!("Re-arm of set {} failed: {}", set, error);
                    outcomes.push(Outcome::StartFailed { set, error });
                }
            }
        }

        outcomes
    }

    fn arm<R: Radio>(
        &mut self,
        registry: &mut AdvertisingRegistry<R>,
        set: SetId,
    ) -> SessionResult<Outcome> {
        let duty = self
            .bindings
            .get(&set)
            .map_or(self.default_duty, Binding::duty);
        registry.start(set, duty)?;

        let directed_peer = registry.get(set).and_then(|s| s.params().directed_peer);
        if let Some(binding) = self.bindings.get_mut(&set) {
            binding.state = BindingState::Advertising;
            binding.connection = directed_peer.map(|peer| Connection {
                handle: None,
                peer,
                originating_set: set,
                state: ConnectionState::Connecting,
            });
        }

        Ok(Outcome::AdvertisingStarted { set, duty })
    }

    fn schedule_rearm(&mut self, set: SetId, now: Instant) -> Option<Outcome> {
        let binding = self.bindings.get_mut(&set)?;
        if binding.suppressed {
            log::debug!("Re-arm of set {} suppressed", set);
            return None;
        }

        if let Some(previous) = binding.rearm.take() {
            self.timers.cancel(previous);
        }
        let deadline = now + self.settle_delay;
        binding.rearm = Some(self.timers.schedule(deadline, set));
        log::debug!("Re-arm of set {} in {:?}", set, self.settle_delay);

        Some(Outcome::RearmScheduled { set, deadline })
    }

    fn cancel_rearm(&mut self, set: SetId) -> bool {
        match self.bindings.get_mut(&set).and_then(|b| b.rearm.take()) {
            Some(id) => self.timers.cancel(id).is_some(),
            None => false,
        }
    }

    fn request_disconnect<R: Radio>(
        &mut self,
        registry: &mut AdvertisingRegistry<R>,
        set: SetId,
        outcomes: &mut Vec<Outcome>,
    ) {
        let reason = self.disconnect_reason;
        let binding = match self.bindings.get_mut(&set) {
            Some(binding) => binding,
            None => return,
        };

        let connection = match binding.connection.as_mut() {
            Some(c) if c.state == ConnectionState::Connected => c,
            _ => {
                log::debug!("No connection to disconnect on set {}", set);
                return;
            }
        };
        let handle = match connection.handle {
            Some(handle) => handle,
            None => return,
        };

        match registry.disconnect(handle, reason) {
            Ok(()) => {
                connection.state = ConnectionState::Disconnecting;
                binding.state = BindingState::Disconnecting;
                outcomes.push(Outcome::DisconnectRequested { set, conn: handle });
            }
            Err(err) => {
                log::warn!("Disconnect failed (err {})", err);
                outcomes.push(Outcome::CommandFailed(err));
            }
        }
    }

    fn change_duty(
        &mut self,
        set: SetId,
        duty: DutyCycle,
        now: Instant,
        outcomes: &mut Vec<Outcome>,
    ) {
        let idle = match self.bindings.get_mut(&set) {
            Some(binding) => {
                binding.duty = duty;
                binding.suppressed = false;
                binding.state == BindingState::Idle
                    && binding.connection.is_none()
                    && binding.rearm.is_none()
            }
            None => return,
        };

        log::info!("Set {} switched to {} advertising", set, duty);
        outcomes.push(Outcome::DutyChanged { set, duty });
        if idle {
            outcomes.extend(self.schedule_rearm(set, now));
        }
    }

    fn resume<R: Radio>(
        &mut self,
        registry: &mut AdvertisingRegistry<R>,
        set: SetId,
        outcomes: &mut Vec<Outcome>,
    ) {
        let idle = match self.bindings.get_mut(&set) {
            Some(binding) => {
                binding.suppressed = false;
                binding.state == BindingState::Idle && !binding.has_live_connection()
            }
            None => return,
        };
        if !idle {
            return;
        }

        self.cancel_rearm(set);
        match self.arm(registry, set) {
            Ok(outcome) => outcomes.push(outcome),
            Err(error) => {
                log::warn!("Advertising for set {} failed to start (err {})", set, error);
                outcomes.push(Outcome::StartFailed { set, error });
            }
        }
    }
}
