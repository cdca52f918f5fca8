//! Keyed, cancellable deadlines owned by the session service.
//!
//! The service loop sleeps until [`TimerSet::next_deadline`] and then drains
//! [`TimerSet::pop_due`]. A cancelled key is gone from both maps, so it can never be
//! returned by `pop_due` afterwards.

use crate::session::TransferId;
use std::collections::{BTreeMap, HashMap};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKey {
    MetadataDeadline(TransferId),
    RetryReadd(TransferId),
    CompletionGrace(TransferId),
    RestoreIntent(TransferId),
    StatusFlush,
}

impl TimerKey {
    pub fn session(self) -> Option<TransferId> {
        match self {
            Self::MetadataDeadline(id)
            | Self::RetryReadd(id)
            | Self::CompletionGrace(id)
            | Self::RestoreIntent(id) => Some(id),
            Self::StatusFlush => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct TimerSet {
    queue: BTreeMap<(Instant, u64), TimerKey>,
    armed: HashMap<TimerKey, (Instant, u64)>,
    next_seq: u64,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `key` to fire at `at`, replacing any earlier deadline for the same key.
    pub fn arm(&mut self, key: TimerKey, at: Instant) {
        self.cancel(key);
        let slot = (at, self.next_seq);
        self.next_seq += 1;
        self.queue.insert(slot, key);
        self.armed.insert(key, slot);
    }

    pub fn cancel(&mut self, key: TimerKey) -> bool {
        match self.armed.remove(&key) {
            Some(slot) => {
                self.queue.remove(&slot);
                true
            }
            None => false,
        }
    }

    /// Cancels every timer that belongs to `id`.
    pub fn cancel_session(&mut self, id: TransferId) -> usize {
        let keys: Vec<TimerKey> = self
            .armed
            .keys()
            .copied()
            .filter(|k| k.session() == Some(id))
            .collect();
        for key in &keys {
            self.cancel(*key);
        }
        keys.len()
    }

    pub fn deadline(&self, key: TimerKey) -> Option<Instant> {
        self.armed.get(&key).map(|(at, _)| *at)
    }

    pub fn is_armed(&self, key: TimerKey) -> bool {
        self.armed.contains_key(&key)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(at, _)| *at)
    }

    /// Removes and returns every key due at `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<TimerKey> {
        let mut due = Vec::new();
        while let Some((&slot, &key)) = self.queue.iter().next() {
            if slot.0 > now {
                break;
            }
            self.queue.remove(&slot);
            self.armed.remove(&key);
            due.push(key);
        }
        due
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.armed.clear();
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(b: u8) -> TransferId {
        TransferId([b; 20])
    }

    #[test]
    fn pop_due_returns_in_deadline_order() {
        let mut timers = TimerSet::new();
        let t0 = Instant::now();
        timers.arm(TimerKey::CompletionGrace(id(1)), t0 + Duration::from_secs(3));
        timers.arm(TimerKey::MetadataDeadline(id(2)), t0 + Duration::from_secs(1));
        timers.arm(TimerKey::StatusFlush, t0 + Duration::from_secs(2));

        assert_eq!(timers.next_deadline(), Some(t0 + Duration::from_secs(1)));
        assert!(timers.pop_due(t0).is_empty());
        assert_eq!(
            timers.pop_due(t0 + Duration::from_secs(2)),
            vec![TimerKey::MetadataDeadline(id(2)), TimerKey::StatusFlush]
        );
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn rearm_replaces_previous_deadline() {
        let mut timers = TimerSet::new();
        let t0 = Instant::now();
        let key = TimerKey::MetadataDeadline(id(1));
        timers.arm(key, t0 + Duration::from_secs(1));
        timers.arm(key, t0 + Duration::from_secs(10));
        assert_eq!(timers.len(), 1);
        assert!(timers.pop_due(t0 + Duration::from_secs(5)).is_empty());
        assert_eq!(timers.deadline(key), Some(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn cancel_session_removes_only_that_session() {
        let mut timers = TimerSet::new();
        let t0 = Instant::now();
        timers.arm(TimerKey::MetadataDeadline(id(1)), t0);
        timers.arm(TimerKey::CompletionGrace(id(1)), t0);
        timers.arm(TimerKey::MetadataDeadline(id(2)), t0);
        timers.arm(TimerKey::StatusFlush, t0);

        assert_eq!(timers.cancel_session(id(1)), 2);
        let due = timers.pop_due(t0);
        assert_eq!(
            due,
            vec![TimerKey::MetadataDeadline(id(2)), TimerKey::StatusFlush]
        );
        assert!(!timers.is_armed(TimerKey::MetadataDeadline(id(1))));
        assert!(timers.is_empty());
    }
}
