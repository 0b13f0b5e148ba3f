//! Deadline bookkeeping for active timers.
//!
//! The wheel tracks one deadline per active timer handle, supplies the
//! driver's poll timeout, and yields expired handles in deadline order.

use crate::handle::HandleId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Deadlines for every active timer, keyed by handle id.
pub(crate) struct TimerWheel {
    deadlines: HashMap<HandleId, Instant>,
}

impl TimerWheel {
    pub(crate) fn new() -> Self {
        Self {
            deadlines: HashMap::new(),
        }
    }

    /// Insert or re-arm a timer. An existing deadline is replaced.
    pub(crate) fn insert(&mut self, id: HandleId, deadline: Instant) {
        self.deadlines.insert(id, deadline);
    }

    /// Remove a timer. Returns whether it was scheduled.
    pub(crate) fn remove(&mut self, id: HandleId) -> bool {
        self.deadlines.remove(&id).is_some()
    }

    /// Whether the timer currently has a scheduled deadline.
    pub(crate) fn contains(&self, id: HandleId) -> bool {
        self.deadlines.contains_key(&id)
    }

    /// The earliest scheduled deadline.
    pub(crate) fn next_expiry(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Time from `now` until the earliest deadline, zero if already due.
    pub(crate) fn timeout_until_next(&self, now: Instant) -> Option<Duration> {
        self.next_expiry()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Remove and return every timer due at `now`, in deadline order
    /// (creation order breaks ties).
    pub(crate) fn drain_expired(&mut self, now: Instant) -> Vec<HandleId> {
        let mut expired: Vec<(Instant, HandleId)> = self
            .deadlines
            .iter()
            .filter(|(_, &deadline)| deadline <= now)
            .map(|(&id, &deadline)| (deadline, id))
            .collect();
        expired.sort();

        let ids: Vec<HandleId> = expired.into_iter().map(|(_, id)| id).collect();
        for id in &ids {
            self.deadlines.remove(id);
        }
        ids
    }

    pub(crate) fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

impl Default for TimerWheel {
    fn default() -> Self {
        Self::new()
    }
}
