use crate::error::{SessionError, SessionResult};
use crate::gap::advertising::{encode_payload, AdvertisingElement, AdvertisingParameters};
use crate::gap::types::{DutyCycle, IdentityTable, SetId};
use crate::radio::{AdvHandle, ConnHandle, Radio, RadioError, StartRequest};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// An independently configured advertising session
#[derive(Debug, Clone)]
pub struct AdvertisingSet {
    id: SetId,
    handle: AdvHandle,
    params: AdvertisingParameters,
    payload: Vec<AdvertisingElement>,
    state: SetState,
}

impl AdvertisingSet {
    pub fn id(&self) -> SetId {
        self.id
    }

    pub fn handle(&self) -> AdvHandle {
        self.handle
    }

    pub fn params(&self) -> &AdvertisingParameters {
        &self.params
    }

    pub fn payload(&self) -> &[AdvertisingElement] {
        &self.payload
    }

    pub fn state(&self) -> SetState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SetState::Starting | SetState::Running)
    }
}

/// Advertising set registry
///
/// Owns the radio and every advertising set created on it. State only
/// changes through the methods below; the registry never polls the radio.
pub struct AdvertisingRegistry<R: Radio> {
    radio: R,
    identities: IdentityTable,
    sets: BTreeMap<SetId, AdvertisingSet>,
    device_name: String,
    max_sets: usize,
    payload_limit: usize,
    next_id: u8,
}

impl<R: Radio> AdvertisingRegistry<R> {
    pub fn new(
        radio: R,
        identities: IdentityTable,
        device_name: String,
        max_sets: usize,
        payload_limit: usize,
    ) -> Self {
        Self {
            radio,
            identities,
            sets: BTreeMap::new(),
            device_name,
            // set ids are a single octet
            max_sets: max_sets.min(usize::from(u8::MAX) + 1),
            payload_limit,
            next_id: 0,
        }
    }

    /// Create a new set in the `Idle` state
    pub fn create(
        &mut self,
        params: AdvertisingParameters,
        payload: Vec<AdvertisingElement>,
    ) -> SessionResult<SetId> {
        params.validate()?;

        if self.identities.get(params.identity).is_none() {
            return Err(SessionError::InvalidParameters(format!(
                "identity {} does not exist",
                params.identity
            )));
        }

        if self.sets.len() >= self.max_sets {
            return Err(SessionError::ResourceExhausted);
        }

        let id = self.allocate_id().ok_or(SessionError::ResourceExhausted)?;
        let handle = self.radio.create_advertising_context(&params).map_err(|err| {
            log::warn!("Could not create advertising set (err {})", err);
            SessionError::from(err)
        })?;
        self.next_id = id.0.wrapping_add(1);

        log::debug!("Created advertising set {} on context {}", id, handle.0);
        self.sets.insert(
            id,
            AdvertisingSet {
                id,
                handle,
                params,
                payload,
                state: SetState::Idle,
            },
        );

        Ok(id)
    }

    /// First free id at or after `next_id`, wrapping around once
    fn allocate_id(&self) -> Option<SetId> {
        (0..=u8::MAX)
            .map(|offset| SetId(self.next_id.wrapping_add(offset)))
            .find(|id| !self.sets.contains_key(id))
    }

    /// Start transmitting an `Idle` set
    pub fn start(&mut self, id: SetId, duty: DutyCycle) -> SessionResult<()> {
        let set = self.sets.get(&id).ok_or(SessionError::UnknownSet(id))?;
        if set.state != SetState::Idle {
            return Err(SessionError::AlreadyRunning(id));
        }

        // A connectable set holds the identity's connection resource
        if set.params.connectable {
            let identity = set.params.identity;
            if let Some(other) = self.sets.values().find(|other| {
                other.id != id
                    && other.is_active()
                    && other.params.connectable
                    && other.params.identity == identity
            }) {
                return Err(SessionError::InvalidState(format!(
                    "identity {} already advertising connectable set {}",
                    identity, other.id
                )));
            }
        }

        let bytes = self.encode(&set.params, &set.payload)?;
        let identity = if set.params.use_identity {
            self.identities.get(set.params.identity).copied()
        } else {
            None
        };
        let handle = set.handle;
        let directed_peer = set.params.directed_peer;

        self.set_state(id, SetState::Starting);
        let request = StartRequest {
            identity,
            directed_peer,
            duty,
            payload: &bytes,
        };

        match self.radio.start_advertising(handle, &request) {
            Ok(()) => {
                self.set_state(id, SetState::Running);
                log::info!("Advertising with set {} successfully started", id);
                Ok(())
            }
            Err(err) => {
                self.set_state(id, SetState::Idle);
                log::warn!("Advertising for set {} failed to start (err {})", id, err);
                Err(set_error(id, err))
            }
        }
    }

    /// Stop a set; stopping an `Idle` set is a no-op
    pub fn stop(&mut self, id: SetId) -> SessionResult<()> {
        let set = self.sets.get(&id).ok_or(SessionError::UnknownSet(id))?;
        if set.state == SetState::Idle {
            return Ok(());
        }

        let handle = set.handle;
        self.set_state(id, SetState::Stopping);
        self.radio.stop_advertising(handle);
        self.set_state(id, SetState::Idle);
        log::info!("Advertising with set {} stopped", id);
        Ok(())
    }

    /// Replace the payload of an `Idle` or `Running` set
    pub fn set_payload(&mut self, id: SetId, elements: Vec<AdvertisingElement>) -> SessionResult<()> {
        let set = self.sets.get(&id).ok_or(SessionError::UnknownSet(id))?;
        let bytes = self.encode(&set.params, &elements)?;

        match set.state {
            SetState::Idle => {}
            SetState::Running => {
                self.radio
                    .update_payload(set.handle, &bytes)
                    .map_err(|err| set_error(id, err))?;
            }
            state => {
                return Err(SessionError::InvalidState(format!(
                    "cannot update payload of set {} while {:?}",
                    id, state
                )));
            }
        }

        if let Some(set) = self.sets.get_mut(&id) {
            set.payload = elements;
        }
        Ok(())
    }

    /// The link layer released a connectable set's context after a connection
    pub(crate) fn mark_released(&mut self, id: SetId) {
        if let Some(set) = self.sets.get_mut(&id) {
            if set.params.connectable {
                set.state = SetState::Idle;
            }
        }
    }

    fn encode(
        &self,
        params: &AdvertisingParameters,
        elements: &[AdvertisingElement],
    ) -> SessionResult<Vec<u8>> {
        if params.use_name && !self.device_name.is_empty() {
            let mut with_name = elements.to_vec();
            with_name.push(AdvertisingElement::complete_name(&self.device_name));
            encode_payload(&with_name, self.payload_limit)
        } else {
            encode_payload(elements, self.payload_limit)
        }
    }

    fn set_state(&mut self, id: SetId, state: SetState) {
        if let Some(set) = self.sets.get_mut(&id) {
            set.state = state;
        }
    }

    pub fn get(&self, id: SetId) -> Option<&AdvertisingSet> {
        self.sets.get(&id)
    }

    pub fn state(&self, id: SetId) -> Option<SetState> {
        self.sets.get(&id).map(AdvertisingSet::state)
    }

    /// Find the set owning a radio context
    pub fn set_for_handle(&self, handle: AdvHandle) -> Option<SetId> {
        self.sets
            .values()
            .find(|set| set.handle == handle)
            .map(AdvertisingSet::id)
    }

    pub fn ids(&self) -> impl Iterator<Item = SetId> + '_ {
        self.sets.keys().copied()
    }

    pub fn identities(&self) -> &IdentityTable {
        &self.identities
    }

    pub fn identities_mut(&mut self) -> &mut IdentityTable {
        &mut self.identities
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub(crate) fn disconnect(&mut self, conn: ConnHandle, reason: u8) -> SessionResult<()> {
        self.radio.disconnect(conn, reason).map_err(SessionError::from)
    }
}

/// Radio failure on a known set. A context that is already transmitting
/// means the set itself is running, not a generic state error.
fn set_error(id: SetId, err: RadioError) -> SessionError {
    match err {
        RadioError::AlreadyActive => SessionError::AlreadyRunning(id),
        other => other.into(),
    }
}
