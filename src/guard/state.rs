//! Per-identity activity state and its store

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

/// Recent activity of one identity. Mutated only as a whole, under its lock.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IdentityActivityState {
    /// Last accepted action
    pub last_action_at: Option<DateTime<Utc>>,
    /// Last checked attempt, accepted or not; burst gaps are measured from it
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Accepted actions inside the trailing window, oldest first
    pub recent: VecDeque<DateTime<Utc>>,
    pub suspicion: u32,
}

impl IdentityActivityState {
    /// Drop timestamps that fell out of the window ending at `now`
    pub fn prune(&mut self, cutoff: DateTime<Utc>) {
        while self.recent.front().is_some_and(|ts| *ts < cutoff) {
            self.recent.pop_front();
        }
    }

    pub fn window_count(&self) -> usize {
        self.recent.len()
    }

    /// Most recent attempt or action, whichever is later
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at.max(self.last_action_at)
    }
}

/// Backing store for per-identity state.
///
/// `update` must run the closure while holding a lock scoped to that identity
/// only, so that concurrent actions of one identity serialize and different
/// identities do not contend.
pub trait ActivityStore: Send + Sync {
    fn update(&self, identity: &str, f: &mut dyn FnMut(&mut IdentityActivityState));

    /// Copy of the current state, if the identity is tracked
    fn snapshot(&self, identity: &str) -> Option<IdentityActivityState>;

    /// Remove identities last seen before `cutoff`
    fn evict_idle(&self, cutoff: DateTime<Utc>) -> usize;

    fn tracked(&self) -> usize;
}

/// In-process store: one mutex per identity inside a sharded map
#[derive(Debug, Default)]
pub struct MemoryActivityStore {
    states: DashMap<String, Mutex<IdentityActivityState>>,
}

impl MemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActivityStore for MemoryActivityStore {
    fn update(&self, identity: &str, f: &mut dyn FnMut(&mut IdentityActivityState)) {
        // Fast path holds only a shard read lock while the identity mutex is taken.
        if let Some(entry) = self.states.get(identity) {
            let mut state = entry.lock();
            f(&mut state);
            return;
        }

        let entry = self
            .states
            .entry(identity.to_string())
            .or_insert_with(|| Mutex::new(IdentityActivityState::default()));
        let mut state = entry.lock();
        f(&mut state);
    }

    fn snapshot(&self, identity: &str) -> Option<IdentityActivityState> {
        self.states.get(identity).map(|entry| entry.lock().clone())
    }

    fn evict_idle(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.states.len();
        self.states.retain(|_, state| {
            state.get_mut().last_seen().is_some_and(|last| last >= cutoff)
        });
        before.saturating_sub(self.states.len())
    }

    fn tracked(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_prune_keeps_window() {
        let now = Utc::now();
        let mut state = IdentityActivityState::default();
        state.recent.push_back(now - Duration::seconds(90));
        state.recent.push_back(now - Duration::seconds(61));
        state.recent.push_back(now - Duration::seconds(30));
        state.recent.push_back(now);

        state.prune(now - Duration::seconds(60));
        assert_eq!(state.window_count(), 2);
    }

    #[test]
    fn test_update_creates_state() {
        let store = MemoryActivityStore::new();
        store.update("user_1", &mut |state| state.suspicion += 3);
        store.update("user_1", &mut |state| state.suspicion += 1);

        assert_eq!(store.snapshot("user_1").unwrap().suspicion, 4);
        assert!(store.snapshot("user_2").is_none());
        assert_eq!(store.tracked(), 1);
    }

    #[test]
    fn test_evict_idle() {
        let store = MemoryActivityStore::new();
        let now = Utc::now();
        store.update("idle", &mut |s| s.last_action_at = Some(now - Duration::hours(2)));
        store.update("active", &mut |s| s.last_action_at = Some(now));
        store.update("never_acted", &mut |s| s.suspicion = 1);
        store.update("rejected_only", &mut |s| s.last_attempt_at = Some(now));

        let evicted = store.evict_idle(now - Duration::minutes(30));
        assert_eq!(evicted, 2);
        assert!(store.snapshot("active").is_some());
        assert!(store.snapshot("rejected_only").is_some());
    }
}
