//! Ranked watchlist cache.
//!
//! Provides in-memory caching with TTL so repeated watchlist requests between
//! screening runs do not re-read and re-merge every source.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use super::clock::Clock;

/// Cache entry with TTL
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    fn new(data: T, now: DateTime<Utc>, ttl_secs: i64) -> Self {
        Self {
            data,
            expires_at: now + Duration::seconds(ttl_secs),
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
}

/// Keyed TTL cache. Expiry is measured against the injected clock.
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    ttl_secs: i64,
    clock: Arc<dyn Clock>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    /// Create with a TTL in seconds
    pub fn with_ttl(ttl_secs: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl_secs,
            clock,
        }
    }

    /// Get a cached value if not expired
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let cache = self.entries.read().ok()?;

        cache.get(key).and_then(|entry| {
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.data.clone())
            }
        })
    }

    /// Cache a value
    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        let entry = CacheEntry::new(value, now, self.ttl_secs);

        if let Ok(mut cache) = self.entries.write() {
            cache.retain(|_, e| !e.is_expired(now));
            cache.insert(key, entry);
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        if let Ok(mut cache) = self.entries.write() {
            cache.clear();
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = self.entries.read().ok();
        let (total, expired) = entries
            .map(|c| {
                let total = c.len();
                let expired = c.values().filter(|e| e.is_expired(now)).count();
                (total, expired)
            })
            .unwrap_or((0, 0));

        CacheStats {
            total_entries: total,
            expired_entries: expired,
        }
    }
}
