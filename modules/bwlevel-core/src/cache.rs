// Resolution cache: player name → last definitive answer.
//
// Entries never expire out of the map. Staleness only disqualifies an entry
// from the fast path; the resolver may still serve it when a refresh comes
// back Unknown. The map grows with the number of distinct names queried.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::types::{PlayerName, Resolution};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: PlayerName,
    pub result: Resolution,
    pub observed_at: Instant,
}

pub struct CacheStore {
    ttl: Duration,
    entries: Mutex<HashMap<PlayerName, CacheEntry>>,
}

impl CacheStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PlayerName, CacheEntry>> {
        // Every critical section is a single map operation, so a poisoned
        // guard still holds a consistent map.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Entry for `key`, fresh or stale.
    pub fn get(&self, key: &PlayerName) -> Option<CacheEntry> {
        self.lock().get(key).cloned()
    }

    /// Store a definitive result. Unknown is refused so a transient failure
    /// is never served as an answer. Returns whether the entry was written.
    pub fn put(&self, key: &PlayerName, result: Resolution, now: Instant) -> bool {
        if !result.is_definitive() {
            debug!(name = %key, "cache: refusing to store unknown result");
            return false;
        }
        self.lock().insert(
            key.clone(),
            CacheEntry {
                key: key.clone(),
                result,
                observed_at: now,
            },
        );
        true
    }

    pub fn is_fresh(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.observed_at) < self.ttl
    }

    /// Fresh entry for `key`, if any.
    pub fn fresh(&self, key: &PlayerName, now: Instant) -> Option<CacheEntry> {
        self.get(key).filter(|entry| self.is_fresh(entry, now))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> PlayerName {
        PlayerName::parse(s).unwrap()
    }

    #[test]
    fn unknown_is_never_stored() {
        let cache = CacheStore::new(Duration::from_secs(60));
        assert!(!cache.put(&name("Alice"), Resolution::Unknown, Instant::now()));
        assert!(cache.get(&name("Alice")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn definitive_results_are_stored() {
        let cache = CacheStore::new(Duration::from_secs(60));
        let now = Instant::now();
        assert!(cache.put(&name("Alice"), Resolution::Numeric(10), now));
        assert!(cache.put(&name("Bob"), Resolution::Concealed, now));

        let alice = cache.get(&name("Alice")).unwrap();
        assert_eq!(alice.result, Resolution::Numeric(10));
        assert_eq!(alice.observed_at, now);
        assert_eq!(cache.get(&name("Bob")).unwrap().result, Resolution::Concealed);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn freshness_is_strictly_less_than_ttl() {
        let cache = CacheStore::new(Duration::from_secs(60));
        let t0 = Instant::now();
        cache.put(&name("Alice"), Resolution::Numeric(10), t0);
        let entry = cache.get(&name("Alice")).unwrap();

        assert!(cache.is_fresh(&entry, t0));
        assert!(cache.is_fresh(&entry, t0 + Duration::from_secs(59)));
        assert!(!cache.is_fresh(&entry, t0 + Duration::from_secs(60)));
        assert!(!cache.is_fresh(&entry, t0 + Duration::from_secs(90)));
    }

    #[test]
    fn stale_entries_stay_readable() {
        let cache = CacheStore::new(Duration::from_secs(60));
        let t0 = Instant::now();
        cache.put(&name("Alice"), Resolution::Numeric(10), t0);

        let later = t0 + Duration::from_secs(90);
        assert!(cache.fresh(&name("Alice"), later).is_none());
        assert_eq!(cache.get(&name("Alice")).unwrap().result, Resolution::Numeric(10));
    }
}
