//! Process-wide wiring of stores, caches and lifecycle services.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use vrepo_cache::ContentCache;
use vrepo_lifecycle::{
    CacheLifecycleManager, CleanupScheduler, HealthReport, InvalidationReport, LifecycleStats,
    NavigationEvent, NavigationInvalidator,
};
use vrepo_store::{InMemoryKeyValueStore, KeyValueStore, SnapshotStore};
use vrepo_types::{Clock, RepoId, SystemClock};

use crate::collaborators::{AllowAll, Caller, ChangePublisher, EntitlementService, OriginFetcher};
use crate::config::VrepoConfig;
use crate::error::{SdkError, SdkResult};
use crate::manager::{RepositoryManager, RepositoryServices};

/// Everything a host needs, built once from a [`VrepoConfig`].
///
/// All repository managers opened through one context share its snapshot
/// store, content cache and lifecycle manager.
pub struct ServiceContext {
    config: VrepoConfig,
    kv: Arc<dyn KeyValueStore>,
    services: RepositoryServices,
    lifecycle: CacheLifecycleManager,
    navigation: NavigationInvalidator,
    scheduler: CleanupScheduler,
}

impl ServiceContext {
    pub fn builder(config: VrepoConfig) -> ServiceContextBuilder {
        ServiceContextBuilder::new(config)
    }

    pub fn config(&self) -> &VrepoConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    pub fn snapshots(&self) -> &Arc<SnapshotStore> {
        &self.services.snapshots
    }

    pub fn content_cache(&self) -> &Arc<ContentCache> {
        &self.services.content_cache
    }

    pub fn services(&self) -> &RepositoryServices {
        &self.services
    }

    pub fn lifecycle(&self) -> &CacheLifecycleManager {
        &self.lifecycle
    }

    pub fn navigation(&self) -> &NavigationInvalidator {
        &self.navigation
    }

    pub fn scheduler(&self) -> &CleanupScheduler {
        &self.scheduler
    }

    // ---- Lifecycle ----

    /// Start the background cleanup jobs. Needs a Tokio runtime.
    pub fn start(&self) -> SdkResult<()> {
        self.scheduler.start()?;
        Ok(())
    }

    /// Stop the background jobs. Returns `false` if a job had to be aborted.
    pub async fn shutdown(&self) -> bool {
        let clean = self.scheduler.shutdown().await;
        info!(clean, "service context shut down");
        clean
    }

    // ---- Repositories ----

    pub async fn open_repository(&self, repo: RepoId, caller: Caller) -> SdkResult<RepositoryManager> {
        RepositoryManager::open(self.services.clone(), repo, caller).await
    }

    /// Drop the cached snapshot of a repository so the next open refetches it.
    pub async fn invalidate_repository(&self, repo: &RepoId) -> SdkResult<bool> {
        let removed = self.services.snapshots.invalidate(repo).await?;
        self.lifecycle.delete(&SnapshotStore::key_for(repo)).await;
        Ok(removed)
    }

    // ---- Navigation and reporting ----

    pub async fn on_transition(&self, event: NavigationEvent) -> InvalidationReport {
        self.navigation.on_transition(event).await
    }

    pub async fn on_page_change(&self, user_id: &str, from: &str, to: &str) -> InvalidationReport {
        self.navigation.on_page_change(user_id, from, to).await
    }

    pub async fn health(&self) -> HealthReport {
        self.lifecycle.health().await
    }

    pub async fn stats(&self) -> LifecycleStats {
        self.lifecycle.stats().await
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("services", &self.services)
            .field("scheduler_running", &self.scheduler.is_running())
            .finish()
    }
}

/// Builder for [`ServiceContext`]. Only the origin is required.
pub struct ServiceContextBuilder {
    config: VrepoConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    origin: Option<Arc<dyn OriginFetcher>>,
    entitlements: Option<Arc<dyn EntitlementService>>,
    publisher: Option<Arc<dyn ChangePublisher>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ServiceContextBuilder {
    pub fn new(config: VrepoConfig) -> Self {
        Self {
            config,
            store: None,
            origin: None,
            entitlements: None,
            publisher: None,
            clock: None,
        }
    }

    /// Shared key-value store. An in-memory store when unset.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_origin(mut self, origin: Arc<dyn OriginFetcher>) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Entitlement checks. Everything is allowed when unset.
    pub fn with_entitlements(mut self, entitlements: Arc<dyn EntitlementService>) -> Self {
        self.entitlements = Some(entitlements);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn ChangePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> SdkResult<ServiceContext> {
        self.config.validate()?;
        let origin = self
            .origin
            .ok_or_else(|| SdkError::Config("an origin fetcher is required".into()))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let kv = self.store.unwrap_or_else(|| {
            Arc::new(InMemoryKeyValueStore::with_clock(clock.clone())) as Arc<dyn KeyValueStore>
        });

        let config = self.config;
        let content_cache = Arc::new(ContentCache::with_clock(
            config.content_cache_config(),
            clock.clone(),
        ));
        let lifecycle = CacheLifecycleManager::with_clock(
            kv.clone(),
            config.lifecycle_config(),
            Some(content_cache.clone()),
            clock,
        );
        let snapshots = Arc::new(SnapshotStore::new(
            kv.clone(),
            Duration::from_secs(config.ttl.repository),
        ));

        let mut services = RepositoryServices::new(snapshots, origin, content_cache)
            .with_entitlements(self.entitlements.unwrap_or_else(|| Arc::new(AllowAll)))
            .with_lifecycle(lifecycle.clone())
            .with_materialize_root(config.materialize_root.clone())
            .with_warming(config.cache.warm_limit, config.cache.warm_max_file_bytes);
        if let Some(publisher) = self.publisher {
            services = services.with_publisher(publisher);
        }

        let navigation = NavigationInvalidator::new(lifecycle.clone())
            .with_history_limit(config.navigation_history_limit);
        let scheduler = CleanupScheduler::new(lifecycle.clone(), config.scheduler_config());

        info!(
            memory_budget = config.memory.budget_bytes,
            cache_entries = config.cache.max_entries,
            "service context ready"
        );
        Ok(ServiceContext {
            config,
            kv,
            services,
            lifecycle,
            navigation,
            scheduler,
        })
    }
}
