//! Category-aware bookkeeping over the remote key-value store.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vrepo_cache::{CacheStats, ContentCache};
use vrepo_store::{KeyValueStore, StoreError};
use vrepo_types::{clock, CacheCategory, Clock, SystemClock, MAX_TTL};

use crate::error::{LifecycleError, LifecycleResult};
use crate::health::{HealthReport, HealthStatus, HealthThresholds};
use crate::pressure::{MemoryPressure, MemoryPressureThresholds};

/// Default time-to-live per cache category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTtls {
    pub repository: Duration,
    pub session: Duration,
    pub user: Duration,
    pub context: Duration,
}

impl Default for CategoryTtls {
    fn default() -> Self {
        Self {
            repository: Duration::from_secs(60 * 60),
            session: Duration::from_secs(30 * 60),
            user: Duration::from_secs(24 * 60 * 60),
            context: Duration::from_secs(15 * 60),
        }
    }
}

impl CategoryTtls {
    pub fn for_category(&self, category: CacheCategory) -> Duration {
        match category {
            CacheCategory::Repository => self.repository,
            CacheCategory::Session => self.session,
            CacheCategory::User => self.user,
            CacheCategory::Context => self.context,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleConfig {
    pub ttl: CategoryTtls,
    /// Bytes of tracked values plus content cache before pressure is `Critical`.
    pub memory_budget: u64,
    pub pressure: MemoryPressureThresholds,
    pub health: HealthThresholds,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ttl: CategoryTtls::default(),
            memory_budget: 256 * 1024 * 1024,
            pressure: MemoryPressureThresholds::default(),
            health: HealthThresholds::default(),
        }
    }
}

/// Outcome of an expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub keys_removed: usize,
    pub cache_entries_removed: usize,
    pub bytes_freed: u64,
}

/// Outcome of a memory optimization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OptimizeReport {
    pub pressure_before: MemoryPressure,
    pub pressure_after: MemoryPressure,
    pub usage_before: u64,
    pub usage_after: u64,
    pub expired: usize,
    pub evicted: usize,
    pub content_cache_cleared: bool,
}

impl OptimizeReport {
    pub fn bytes_freed(&self) -> u64 {
        self.usage_before.saturating_sub(self.usage_after)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub keys: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleStats {
    pub categories: BTreeMap<CacheCategory, CategoryStats>,
    pub memory_usage: u64,
    pub memory_budget: u64,
    pub pressure: MemoryPressure,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub content_cache: Option<CacheStats>,
}

impl LifecycleStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn total_keys(&self) -> usize {
        self.categories.values().map(|c| c.keys).sum()
    }
}

struct TrackedKey {
    category: CacheCategory,
    size: u64,
    created_at: Instant,
    expires_at: Instant,
}

/// Upper bound on remembered store errors, far above any health threshold.
const MAX_RECORDED_ERRORS: usize = 1024;

/// Clears the relief flag when a pressure relief pass ends, even by panic.
struct ReliefGuard(Arc<LifecycleInner>);

impl Drop for ReliefGuard {
    fn drop(&mut self) {
        self.0.relief_in_flight.store(false, Ordering::Release);
    }
}

struct LifecycleInner {
    kv: Arc<dyn KeyValueStore>,
    content: Option<Arc<ContentCache>>,
    config: LifecycleConfig,
    clock: Arc<dyn Clock>,
    tracked: Mutex<HashMap<String, TrackedKey>>,
    errors: Mutex<VecDeque<Instant>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    relief_in_flight: AtomicBool,
}

/// TTL, expiry and memory bookkeeping for every category-keyed value.
///
/// Values live in the remote store, which enforces TTLs itself; this
/// manager keeps a local ledger of sizes and deadlines so that memory
/// pressure can be measured and the shortest-lived data evicted first.
/// Cloning is cheap and shares state.
#[derive(Clone)]
pub struct CacheLifecycleManager {
    inner: Arc<LifecycleInner>,
}

impl CacheLifecycleManager {
    pub fn new(kv: Arc<dyn KeyValueStore>, config: LifecycleConfig) -> Self {
        Self::with_clock(kv, config, None, Arc::new(SystemClock))
    }

    /// Also account for, and relieve pressure on, a VFS content cache.
    pub fn with_content_cache(
        kv: Arc<dyn KeyValueStore>,
        config: LifecycleConfig,
        content: Arc<ContentCache>,
    ) -> Self {
        Self::with_clock(kv, config, Some(content), Arc::new(SystemClock))
    }

    pub fn with_clock(
        kv: Arc<dyn KeyValueStore>,
        config: LifecycleConfig,
        content: Option<Arc<ContentCache>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(LifecycleInner {
                kv,
                content,
                config,
                clock,
                tracked: Mutex::new(HashMap::new()),
                errors: Mutex::new(VecDeque::new()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                expired: AtomicU64::new(0),
                relief_in_flight: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.inner.kv
    }

    pub fn content_cache(&self) -> Option<&Arc<ContentCache>> {
        self.inner.content.as_ref()
    }

    pub fn ttl_for(&self, category: CacheCategory) -> Duration {
        self.inner.config.ttl.for_category(category)
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    /// Store `value` under `key` with its category's TTL.
    pub async fn set(&self, key: &str, value: Vec<u8>) -> LifecycleResult<()> {
        let category = category_of(key)?;
        self.set_with_ttl(key, value, self.ttl_for(category)).await
    }

    pub async fn set_with_ttl(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> LifecycleResult<()> {
        let category = category_of(key)?;
        let size = value.len() as u64;
        if let Err(e) = self.inner.kv.set(key, value, Some(ttl)).await {
            self.record_error(&e);
            return Err(e.into());
        }

        debug!(key, category = %category, bytes = size, ttl = ?ttl, "cache value stored");
        self.track(key, size, ttl)
    }

    /// Record a value some other component already wrote to the store, so
    /// that its size and deadline count toward memory pressure.
    pub fn track(&self, key: &str, size: u64, ttl: Duration) -> LifecycleResult<()> {
        let category = category_of(key)?;
        let now = self.inner.clock.now();
        self.tracked().insert(
            key.to_string(),
            TrackedKey {
                category,
                size,
                created_at: now,
                expires_at: clock::deadline(now, ttl),
            },
        );
        if self.pressure().needs_relief() {
            self.request_pressure_relief();
        }
        Ok(())
    }

    /// Fetch a value. Store failures are logged and read as a miss.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.inner.kv.get(key).await {
            Ok(Some(value)) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Ok(None) => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                if self.tracked().remove(key).is_some() {
                    self.inner.expired.fetch_add(1, Ordering::Relaxed);
                }
                None
            }
            Err(e) => {
                self.record_error(&e);
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.tracked().remove(key);
        match self.inner.kv.delete(key).await {
            Ok(existed) => existed,
            Err(e) => {
                self.record_error(&e);
                false
            }
        }
    }

    /// Push a live key's expiry out by `extra`. Returns `false` for missing
    /// keys, keys without a TTL, and store failures.
    pub async fn extend_ttl(&self, key: &str, extra: Duration) -> bool {
        let remaining = match self.inner.kv.ttl(key).await {
            Ok(Some(remaining)) => remaining,
            Ok(None) => return false,
            Err(e) => {
                self.record_error(&e);
                return false;
            }
        };
        let ttl = remaining.saturating_add(extra).min(MAX_TTL);
        match self.inner.kv.expire(key, ttl).await {
            Ok(true) => {
                let now = self.inner.clock.now();
                if let Some(entry) = self.tracked().get_mut(key) {
                    entry.expires_at = clock::deadline(now, ttl);
                }
                debug!(key, ttl = ?ttl, "ttl extended");
                true
            }
            Ok(false) => false,
            Err(e) => {
                self.record_error(&e);
                false
            }
        }
    }

    pub async fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        match self.inner.kv.ttl(key).await {
            Ok(ttl) => ttl,
            Err(e) => {
                self.record_error(&e);
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Invalidation
    // ------------------------------------------------------------------

    /// Drop every key in `category`. Invalidating repositories also clears
    /// the content cache, whose bodies were sliced from those snapshots.
    pub async fn invalidate_category(&self, category: CacheCategory) -> usize {
        let removed = self.invalidate_prefix(category.prefix()).await;
        if category == CacheCategory::Repository {
            if let Some(content) = &self.inner.content {
                let freed = content.clear();
                debug!(bytes = freed, "content cache cleared with repository category");
            }
        }
        info!(category = %category, removed, "category invalidated");
        removed
    }

    /// Drop the key `{prefix}{scope}` and every key under `{prefix}{scope}:`.
    ///
    /// `invalidate_scoped(Session, "alice")` removes all of alice's sessions
    /// without touching `session:alicia:...`.
    pub async fn invalidate_scoped(&self, category: CacheCategory, scope: &str) -> usize {
        let exact = format!("{}{}", category.prefix(), scope);
        let mut removed = usize::from(self.delete(&exact).await);
        removed += self.invalidate_prefix(&format!("{exact}:")).await;
        info!(category = %category, scope, removed, "scope invalidated");
        removed
    }

    async fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.tracked().retain(|key, _| !key.starts_with(prefix));
        match self.inner.kv.delete_prefix(prefix).await {
            Ok(removed) => removed,
            Err(e) => {
                self.record_error(&e);
                0
            }
        }
    }

    // ------------------------------------------------------------------
    // Expiry and memory
    // ------------------------------------------------------------------

    /// Forget every tracked key whose deadline has passed and sweep the
    /// content cache.
    pub async fn sweep_expired(&self) -> SweepReport {
        let now = self.inner.clock.now();
        let expired: Vec<(String, u64)> = {
            let mut tracked = self.tracked();
            let keys: Vec<String> = tracked
                .iter()
                .filter(|(_, t)| t.expires_at <= now)
                .map(|(k, _)| k.clone())
                .collect();
            keys.into_iter()
                .filter_map(|k| tracked.remove(&k).map(|t| (k, t.size)))
                .collect()
        };

        let mut report = SweepReport::default();
        for (key, size) in &expired {
            // Stores with native TTLs have already dropped these.
            if let Err(e) = self.inner.kv.delete(key).await {
                debug!(key = %key, error = %e, "expired key delete failed");
            }
            report.bytes_freed += size;
        }
        report.keys_removed = expired.len();
        self.inner
            .expired
            .fetch_add(expired.len() as u64, Ordering::Relaxed);

        if let Some(content) = &self.inner.content {
            let before = content.total_bytes() as u64;
            report.cache_entries_removed = content.cleanup_expired();
            report.bytes_freed += before.saturating_sub(content.total_bytes() as u64);
        }

        if report.keys_removed > 0 || report.cache_entries_removed > 0 {
            info!(
                keys = report.keys_removed,
                cache_entries = report.cache_entries_removed,
                bytes_freed = report.bytes_freed,
                "expired entries swept"
            );
        }
        report
    }

    /// Tracked value bytes plus content cache bytes.
    pub fn memory_usage(&self) -> u64 {
        let tracked: u64 = self.tracked().values().map(|t| t.size).sum();
        let content = self
            .inner
            .content
            .as_ref()
            .map_or(0, |c| c.total_bytes() as u64);
        tracked + content
    }

    pub fn pressure(&self) -> MemoryPressure {
        self.inner
            .config
            .pressure
            .level_for_usage(self.memory_usage(), self.inner.config.memory_budget)
    }

    /// Sweep, then while at or above the high threshold evict tracked keys
    /// from the shortest-lived categories first, oldest first within a
    /// category. If that is not enough the content cache is cleared.
    pub async fn optimize_memory(&self) -> OptimizeReport {
        let usage_before = self.memory_usage();
        let pressure_before = self.pressure();
        let expired = self.sweep_expired().await.keys_removed;

        let budget = self.inner.config.memory_budget;
        let high_water = self.inner.config.pressure.high_water_mark(budget);
        let mut evicted = 0;
        let mut content_cache_cleared = false;

        if self.memory_usage() >= high_water {
            let mut usage = self.memory_usage();
            for key in self.eviction_order() {
                if usage < high_water {
                    break;
                }
                let Some(entry) = self.tracked().remove(&key) else {
                    continue;
                };
                if let Err(e) = self.inner.kv.delete(&key).await {
                    warn!(key = %key, error = %e, "eviction delete failed");
                }
                usage = usage.saturating_sub(entry.size);
                evicted += 1;
            }

            if usage >= high_water {
                if let Some(content) = &self.inner.content {
                    content.clear();
                    content_cache_cleared = true;
                }
            }
        }

        let report = OptimizeReport {
            pressure_before,
            pressure_after: self.pressure(),
            usage_before,
            usage_after: self.memory_usage(),
            expired,
            evicted,
            content_cache_cleared,
        };
        if evicted > 0 || content_cache_cleared {
            info!(
                evicted,
                expired,
                bytes_freed = report.bytes_freed(),
                before = %report.pressure_before,
                after = %report.pressure_after,
                "memory optimized"
            );
        }
        report
    }

    fn eviction_order(&self) -> Vec<String> {
        let tracked = self.tracked();
        let mut order: Vec<(Duration, Instant, &String)> = tracked
            .iter()
            .map(|(k, t)| (self.ttl_for(t.category), t.created_at, k))
            .collect();
        order.sort();
        order.into_iter().map(|(_, _, k)| k.clone()).collect()
    }

    /// Start a background [`optimize_memory`](Self::optimize_memory) pass
    /// without waiting for it. At most one pass runs at a time; returns
    /// whether a new pass was started.
    pub fn request_pressure_relief(&self) -> bool {
        if self
            .inner
            .relief_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("pressure relief already in flight");
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.inner.relief_in_flight.store(false, Ordering::Release);
            warn!("no async runtime, pressure relief skipped");
            return false;
        };

        let manager = self.clone();
        let guard = ReliefGuard(self.inner.clone());
        runtime.spawn(async move {
            let _guard = guard;
            let report = manager.optimize_memory().await;
            debug!(evicted = report.evicted, "pressure relief finished");
        });
        true
    }

    pub fn relief_in_flight(&self) -> bool {
        self.inner.relief_in_flight.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Observability
    // ------------------------------------------------------------------

    /// Per-category key counts come from the store when it answers, and
    /// from the local ledger otherwise.
    pub async fn stats(&self) -> LifecycleStats {
        let mut categories = BTreeMap::new();
        for category in CacheCategory::ALL {
            let (ledger_keys, bytes) = {
                let tracked = self.tracked();
                tracked
                    .values()
                    .filter(|t| t.category == category)
                    .fold((0usize, 0u64), |(n, b), t| (n + 1, b + t.size))
            };
            let keys = match self.inner.kv.keys_with_prefix(category.prefix()).await {
                Ok(keys) => keys.len(),
                Err(e) => {
                    self.record_error(&e);
                    ledger_keys
                }
            };
            categories.insert(category, CategoryStats { keys, bytes });
        }

        LifecycleStats {
            categories,
            memory_usage: self.memory_usage(),
            memory_budget: self.inner.config.memory_budget,
            pressure: self.pressure(),
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            expired: self.inner.expired.load(Ordering::Relaxed),
            content_cache: self.inner.content.as_ref().map(|c| c.stats()),
        }
    }

    /// Ping the store and classify latency, recent errors and pressure.
    pub async fn health(&self) -> HealthReport {
        let started = Instant::now();
        let ping = self.inner.kv.ping().await;
        let latency = started.elapsed();
        let pressure = self.pressure();
        let memory_usage = self.memory_usage();

        match ping {
            Ok(()) => {
                let recent_errors = self.recent_errors();
                let (status, reasons) =
                    self.inner
                        .config
                        .health
                        .classify(latency, recent_errors, pressure);
                HealthReport {
                    status,
                    latency: Some(latency),
                    recent_errors,
                    memory_pressure: pressure,
                    memory_usage,
                    reasons,
                }
            }
            Err(e) => {
                self.record_error(&e);
                HealthReport {
                    status: HealthStatus::Unhealthy,
                    latency: None,
                    recent_errors: self.recent_errors(),
                    memory_pressure: pressure,
                    memory_usage,
                    reasons: vec![format!("store unreachable: {e}")],
                }
            }
        }
    }

    /// Errors recorded inside the health error window.
    pub fn recent_errors(&self) -> usize {
        let now = self.inner.clock.now();
        let mut errors = self.errors();
        self.prune_errors(&mut errors, now);
        errors.len()
    }

    fn record_error(&self, error: &StoreError) {
        warn!(error = %error, transient = error.is_transient(), "cache store operation failed");
        let now = self.inner.clock.now();
        let mut errors = self.errors();
        self.prune_errors(&mut errors, now);
        if errors.len() >= MAX_RECORDED_ERRORS {
            errors.pop_front();
        }
        errors.push_back(now);
    }

    fn prune_errors(&self, errors: &mut VecDeque<Instant>, now: Instant) {
        let window = self.inner.config.health.error_window;
        while errors
            .front()
            .is_some_and(|at| now.saturating_duration_since(*at) > window)
        {
            errors.pop_front();
        }
    }

    fn tracked(&self) -> std::sync::MutexGuard<'_, HashMap<String, TrackedKey>> {
        self.inner.tracked.lock().expect("lifecycle ledger lock poisoned")
    }

    fn errors(&self) -> std::sync::MutexGuard<'_, VecDeque<Instant>> {
        self.inner.errors.lock().expect("lifecycle error log lock poisoned")
    }
}

impl fmt::Debug for CacheLifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheLifecycleManager")
            .field("tracked_keys", &self.tracked().len())
            .field("memory_budget", &self.inner.config.memory_budget)
            .field("relief_in_flight", &self.relief_in_flight())
            .finish()
    }
}

fn category_of(key: &str) -> LifecycleResult<CacheCategory> {
    CacheCategory::of_key(key).ok_or_else(|| LifecycleError::UnknownCategory(key.to_string()))
}
