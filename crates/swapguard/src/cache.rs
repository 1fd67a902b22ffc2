//! Keyed response cache with a fixed time-to-live.
//!
//! Expiry is lazy: an entry past its TTL stays in memory until the next `get` for that key
//! (or a `clear`). There is no background sweeper.

use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::time::Instant;
use tracing::debug;

pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Build the cache key for an endpoint and its parameter set.
///
/// Parameters are rendered in key order, so equal parameter sets map to equal keys.
pub fn cache_key(endpoint: &str, params: &BTreeMap<&str, String>) -> String {
    let query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{endpoint}?{}", query.join("&"))
}

#[derive(Debug, Clone)]
struct Entry<V> {
    payload: V,
    inserted_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub count: usize,
    pub keys: Vec<String>,
}

#[derive(Debug)]
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    ttl: Duration,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: CACHE_TTL,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        // A panic while holding the lock cannot leave a half-written entry behind.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.lock();
        let fresh = entries
            .get(key)
            .map(|e| e.inserted_at.elapsed() < self.ttl)?;
        if fresh {
            debug!(key, "cache hit");
            entries.get(key).map(|e| e.payload.clone())
        } else {
            debug!(key, "cache entry expired");
            entries.remove(key);
            None
        }
    }

    /// Store `payload` under `key`, replacing any previous entry and resetting its age.
    pub fn set(&self, key: impl Into<String>, payload: V) {
        self.lock().insert(
            key.into(),
            Entry {
                payload,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        CacheStats {
            count: entries.len(),
            keys,
        }
    }
}
