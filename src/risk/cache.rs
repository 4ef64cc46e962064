//! Origin classification cache

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::risk::OriginRecord;

/// Cache of origin records keyed by normalized address
pub trait OriginCache: Send + Sync {
    /// Fresh entry for `address`. Stale entries are evicted and reported absent.
    fn get(&self, address: &str, now: DateTime<Utc>, ttl: Duration) -> Option<OriginRecord>;

    fn insert(&self, record: OriginRecord);

    /// Drop every entry older than `ttl`; returns how many were removed
    fn purge_expired(&self, now: DateTime<Utc>, ttl: Duration) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self);
}

/// In-process cache backed by a concurrent map
#[derive(Debug, Default)]
pub struct MemoryOriginCache {
    entries: DashMap<String, OriginRecord>,
}

impl MemoryOriginCache {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_fresh(record: &OriginRecord, now: DateTime<Utc>, ttl: Duration) -> bool {
    now.signed_duration_since(record.cached_at) < ttl
}

impl OriginCache for MemoryOriginCache {
    fn get(&self, address: &str, now: DateTime<Utc>, ttl: Duration) -> Option<OriginRecord> {
        let record = self.entries.get(address)?.value().clone();
        if is_fresh(&record, now, ttl) {
            return Some(record);
        }
        // Only remove the entry we saw; a concurrent refresh may have replaced it.
        self.entries
            .remove_if(address, |_, current| current.cached_at == record.cached_at);
        None
    }

    fn insert(&self, record: OriginRecord) {
        self.entries.insert(record.address.clone(), record);
    }

    fn purge_expired(&self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, record| is_fresh(record, now, ttl));
        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(address: &str, cached_at: DateTime<Utc>) -> OriginRecord {
        OriginRecord {
            cached_at,
            ..OriginRecord::safe_default(address)
        }
    }

    #[test]
    fn test_fresh_entry_is_returned() {
        let cache = MemoryOriginCache::new();
        let now = Utc::now();
        cache.insert(record("81.2.69.142", now));

        let hit = cache.get("81.2.69.142", now + Duration::hours(23), Duration::hours(24));
        assert!(hit.is_some());
    }

    #[test]
    fn test_stale_entry_is_evicted_on_read() {
        let cache = MemoryOriginCache::new();
        let now = Utc::now();
        cache.insert(record("81.2.69.142", now));

        let miss = cache.get("81.2.69.142", now + Duration::hours(24), Duration::hours(24));
        assert!(miss.is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let cache = MemoryOriginCache::new();
        let now = Utc::now();
        cache.insert(record("81.2.69.142", now - Duration::hours(30)));
        cache.insert(record("81.2.69.143", now));

        assert_eq!(cache.purge_expired(now, Duration::hours(24)), 1);
        assert_eq!(cache.len(), 1);
    }
}
