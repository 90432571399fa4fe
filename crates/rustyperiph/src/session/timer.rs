//! Cancellable one-shot timers
//!
//! Entries fire in deadline order; entries sharing a deadline fire in the
//! order they were scheduled. A cancelled entry is removed outright.

use std::collections::BTreeMap;
use std::time::Instant;

/// Token identifying a scheduled entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug)]
pub struct TimerQueue<T> {
    entries: BTreeMap<(Instant, TimerId), T>,
    next_id: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 0,
        }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `item` to fire at `deadline`
    pub fn schedule(&mut self, deadline: Instant, item: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.insert((deadline, id), item);
        log::trace!("Timer {} armed", id.0);
        id
    }

    /// Remove a pending entry, returning its item if it had not fired yet
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let key = self.entries.keys().find(|(_, entry)| *entry == id).copied()?;
        log::trace!("Timer {} cancelled", id.0);
        self.entries.remove(&key)
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Take the earliest entry whose deadline is at or before `now`
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerId, T)> {
        let key = *self.entries.keys().next()?;
        if key.0 > now {
            return None;
        }
        self.entries.remove(&key).map(|item| (key.1, item))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
