use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use vrepo_types::{clock, Clock, SystemClock};

use crate::error::{StoreError, StoreResult};
use crate::traits::KeyValueStore;

struct StoredValue {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-memory, HashMap-based key-value store.
///
/// Intended for tests and single-process embedding. TTLs are evaluated
/// against the injected [`Clock`]; expired values are hidden immediately and
/// physically dropped by [`InMemoryKeyValueStore::purge_expired`] or when
/// overwritten.
pub struct InMemoryKeyValueStore {
    values: RwLock<HashMap<String, StoredValue>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl InMemoryKeyValueStore {
    /// Create a new empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a new empty store on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: while unavailable every operation fails with
    /// [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.values
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|v| v.is_live(now))
            .count()
    }

    /// Returns `true` if there are no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes across all live values.
    pub fn total_bytes(&self) -> u64 {
        let now = self.clock.now();
        self.values
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|v| v.is_live(now))
            .map(|v| v.value.len() as u64)
            .sum()
    }

    /// Drop every expired value and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut map = self.values.write().expect("lock poisoned");
        let before = map.len();
        map.retain(|_, v| v.is_live(now));
        before - map.len()
    }

    /// Remove all values.
    pub fn clear(&self) {
        self.values.write().expect("lock poisoned").clear();
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store marked offline".into()))
        }
    }
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

fn check_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check_available()?;
        let now = self.clock.now();
        let map = self.values.read().expect("lock poisoned");
        Ok(map
            .get(key)
            .filter(|v| v.is_live(now))
            .map(|v| v.value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()> {
        self.check_available()?;
        check_key(key)?;
        let expires_at = ttl.map(|ttl| clock::deadline(self.clock.now(), ttl));
        let mut map = self.values.write().expect("lock poisoned");
        map.insert(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.check_available()?;
        let now = self.clock.now();
        let mut map = self.values.write().expect("lock poisoned");
        Ok(map.remove(key).is_some_and(|v| v.is_live(now)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.check_available()?;
        let now = self.clock.now();
        let mut map = self.values.write().expect("lock poisoned");
        match map.get_mut(key) {
            Some(v) if v.is_live(now) => {
                v.expires_at = Some(clock::deadline(now, ttl));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        self.check_available()?;
        let now = self.clock.now();
        let map = self.values.read().expect("lock poisoned");
        Ok(map
            .get(key)
            .filter(|v| v.is_live(now))
            .and_then(|v| v.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.check_available()?;
        let now = self.clock.now();
        let map = self.values.read().expect("lock poisoned");
        let mut keys: Vec<String> = map
            .iter()
            .filter(|(k, v)| k.starts_with(prefix) && v.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_prefix(&self, prefix: &str) -> StoreResult<usize> {
        self.check_available()?;
        let now = self.clock.now();
        let mut map = self.values.write().expect("lock poisoned");
        let mut removed = 0;
        map.retain(|k, v| {
            if k.starts_with(prefix) {
                if v.is_live(now) {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });
        Ok(removed)
    }
}

impl std::fmt::Debug for InMemoryKeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryKeyValueStore")
            .field("key_count", &self.len())
            .field("available", &self.available.load(Ordering::SeqCst))
            .finish()
    }
}
