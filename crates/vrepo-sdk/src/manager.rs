//! Per-repository facade used by the hosting application.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, error, info, warn};
use vrepo_cache::ContentCache;
use vrepo_lifecycle::CacheLifecycleManager;
use vrepo_store::{validate_snapshot, SnapshotLookup, SnapshotStore};
use vrepo_types::{ContentHasher, Digest, RepoId, RepositorySnapshot};
use vrepo_vcs::{FileDiff, RepoStatus, VcsError, VcsShim, VersionControl};
use vrepo_vfs::{FileAccess, VfsError, VfsResult, VirtualFileSystem};

use crate::collaborators::{
    AccessDecision, Caller, ChangePublisher, ChangeSet, EntitlementService, OriginFetcher,
    PublishReceipt,
};
use crate::error::{SdkError, SdkResult};
use crate::materialize::Materializer;

/// How the snapshot behind a manager was obtained.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// Served from the snapshot store.
    Cached,
    /// Fetched from the origin after a miss or a corrupt entry.
    Recovered,
    /// Recovery failed; the repository is empty.
    Degraded { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub outcome: LoadOutcome,
    /// Origin fetches made while loading: 0 or 1.
    pub fetch_attempts: u32,
    /// Why the cached entry was rejected, if it was corrupt.
    pub corrupt_reason: Option<String>,
}

impl LoadReport {
    pub fn is_degraded(&self) -> bool {
        matches!(self.outcome, LoadOutcome::Degraded { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "receipt", rename_all = "snake_case")]
pub enum PublishOutcome {
    Published(PublishReceipt),
    /// This session already published; nothing was sent.
    Duplicate(PublishReceipt),
    NothingToPublish,
}

type PublishKey = (String, RepoId);

/// Shared collaborators and settings for every [`RepositoryManager`].
#[derive(Clone)]
pub struct RepositoryServices {
    pub snapshots: Arc<SnapshotStore>,
    pub origin: Arc<dyn OriginFetcher>,
    pub entitlements: Arc<dyn EntitlementService>,
    pub publisher: Option<Arc<dyn ChangePublisher>>,
    pub content_cache: Arc<ContentCache>,
    /// Snapshot writes are reported here so they count toward memory pressure.
    pub lifecycle: Option<CacheLifecycleManager>,
    pub materialize_root: Option<PathBuf>,
    pub warm_limit: usize,
    pub warm_max_file_bytes: u64,
    published: Arc<Mutex<HashMap<PublishKey, PublishReceipt>>>,
}

impl RepositoryServices {
    /// Services with no publisher, allow-all entitlements and no warming.
    pub fn new(
        snapshots: Arc<SnapshotStore>,
        origin: Arc<dyn OriginFetcher>,
        content_cache: Arc<ContentCache>,
    ) -> Self {
        Self {
            snapshots,
            origin,
            entitlements: Arc::new(crate::collaborators::AllowAll),
            publisher: None,
            content_cache,
            lifecycle: None,
            materialize_root: None,
            warm_limit: 0,
            warm_max_file_bytes: 0,
            published: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_entitlements(mut self, entitlements: Arc<dyn EntitlementService>) -> Self {
        self.entitlements = entitlements;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn ChangePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: CacheLifecycleManager) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn with_materialize_root(mut self, root: Option<PathBuf>) -> Self {
        self.materialize_root = root;
        self
    }

    pub fn with_warming(mut self, limit: usize, max_file_bytes: u64) -> Self {
        self.warm_limit = limit;
        self.warm_max_file_bytes = max_file_bytes;
        self
    }

    fn published_receipt(&self, key: &PublishKey) -> Option<PublishReceipt> {
        self.published
            .lock()
            .expect("publish ledger lock poisoned")
            .get(key)
            .cloned()
    }

    fn record_published(&self, key: PublishKey, receipt: PublishReceipt) {
        self.published
            .lock()
            .expect("publish ledger lock poisoned")
            .insert(key, receipt);
    }
}

impl std::fmt::Debug for RepositoryServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryServices")
            .field("publisher", &self.publisher.is_some())
            .field("lifecycle", &self.lifecycle.is_some())
            .field("materialize_root", &self.materialize_root)
            .field("warm_limit", &self.warm_limit)
            .finish()
    }
}

/// One caller's view of one repository.
///
/// Reads go through a [`VcsShim`] overlay on the snapshot's VFS; writes are
/// buffered in that overlay and never touch the cached snapshot. A single
/// manager is not meant to be mutated from several tasks at once.
pub struct RepositoryManager {
    repo: RepoId,
    caller: Caller,
    services: RepositoryServices,
    vfs: Arc<VirtualFileSystem>,
    shim: VcsShim,
    load: LoadReport,
    materializer: Materializer,
    closed: bool,
}

impl RepositoryManager {
    /// Check entitlement, then load the snapshot with at most one recovery
    /// fetch. The only error is [`SdkError::EntitlementDenied`].
    pub async fn open(services: RepositoryServices, repo: RepoId, caller: Caller) -> SdkResult<Self> {
        check_entitlement(&services, &repo, &caller).await?;
        let (vfs, load) = load_vfs(&services, &repo).await;

        if services.warm_limit > 0 && !vfs.is_empty() {
            let warmed = vfs.warm_cache(services.warm_limit, services.warm_max_file_bytes);
            debug!(repo = %repo, warmed, "content cache warmed");
        }

        info!(
            repo = %repo,
            user = %caller.user_id,
            files = vfs.len(),
            outcome = ?load.outcome,
            "repository opened"
        );
        let materializer = Materializer::new(repo.slug(), services.materialize_root.clone());
        Ok(Self {
            shim: VcsShim::new(vfs.clone()),
            repo,
            caller,
            services,
            vfs,
            load,
            materializer,
            closed: false,
        })
    }

    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.load
    }

    pub fn vfs(&self) -> &Arc<VirtualFileSystem> {
        &self.vfs
    }

    pub fn shim(&self) -> &VcsShim {
        &self.shim
    }

    pub fn shim_mut(&mut self) -> &mut VcsShim {
        &mut self.shim
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    /// Buffered content first, then the snapshot.
    pub fn read_file(&self, file_path: &str) -> Option<Arc<str>> {
        self.shim.read(file_path)
    }

    pub fn exists(&self, file_path: &str) -> bool {
        self.shim.exists(file_path)
    }

    pub fn write_file(&mut self, file_path: &str, content: &str) -> SdkResult<()> {
        self.buffer_write(file_path, content)?;
        Ok(())
    }

    /// Returns `false` if there was nothing to delete.
    pub fn delete_file(&mut self, file_path: &str) -> SdkResult<bool> {
        let deleted = self.shim.record_delete(file_path)?;
        if deleted {
            self.materializer.discard(file_path);
        }
        Ok(deleted)
    }

    /// Paths whose buffered content differs from the snapshot.
    pub fn pending_changes(&self) -> Vec<String> {
        self.shim.changed_paths()
    }

    pub fn status(&self) -> RepoStatus {
        self.shim.status()
    }

    pub fn diff(&self, file_path: &str) -> Option<FileDiff> {
        self.shim.diff(file_path)
    }

    fn buffer_write(&mut self, file_path: &str, content: &str) -> Result<(), VcsError> {
        self.shim.record_write(file_path, content)?;
        if self.materializer.is_materialized(file_path) {
            self.materializer.write(file_path, content);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Publish
    // ------------------------------------------------------------------

    /// Propose the buffered changes upstream, once per session.
    ///
    /// After a successful publish the changes are committed in the shim.
    /// A later call in the same session, from this manager or another one,
    /// returns [`PublishOutcome::Duplicate`] without contacting the
    /// publisher.
    pub async fn publish(&mut self, message: &str) -> SdkResult<PublishOutcome> {
        let key = (self.caller.session_id.clone(), self.repo.clone());
        if let Some(receipt) = self.services.published_receipt(&key) {
            info!(repo = %self.repo, session = %self.caller.session_id, "already published in this session");
            return Ok(PublishOutcome::Duplicate(receipt));
        }

        let changed = self.shim.changed_paths();
        if changed.is_empty() {
            return Ok(PublishOutcome::NothingToPublish);
        }
        let publisher = self
            .services
            .publisher
            .clone()
            .ok_or_else(|| SdkError::Publish("no change publisher configured".into()))?;

        let files: BTreeMap<String, Option<String>> = changed
            .iter()
            .map(|p| (p.clone(), self.shim.read(p).map(|c| c.to_string())))
            .collect();
        let changes = ChangeSet {
            proposal_id: proposal_id(&self.repo, &self.caller.session_id, message, &files),
            repo: self.repo.clone(),
            message: message.to_string(),
            diffs: self.shim.diff_all(),
            files,
        };

        let receipt = publisher.publish(&changes, &self.caller).await?;
        self.shim.add_all();
        self.shim.commit(message);
        self.services.record_published(key, receipt.clone());
        info!(
            repo = %self.repo,
            proposal = %receipt.proposal_id,
            reference = %receipt.reference,
            files = changes.files.len(),
            "changes published"
        );
        Ok(PublishOutcome::Published(receipt))
    }

    // ------------------------------------------------------------------
    // Materialization and cleanup
    // ------------------------------------------------------------------

    /// Write one file to disk for tools that need a real path. `None` if
    /// the file does not exist, could not be written, or the manager has
    /// already been cleaned up.
    pub fn materialize(&mut self, file_path: &str) -> Option<PathBuf> {
        if self.closed {
            warn!(repo = %self.repo, path = %file_path, "materialize after cleanup refused");
            return None;
        }
        let content = self.read_file(file_path)?;
        self.materializer.write(file_path, &content)
    }

    pub fn scratch_dir(&self) -> Option<&std::path::Path> {
        self.materializer.scratch_dir()
    }

    /// Remove materialized files and drop this repository's cached file
    /// bodies. Safe to call repeatedly; returns files removed by this call.
    pub fn cleanup(&mut self) -> usize {
        if self.closed {
            return 0;
        }
        self.closed = true;
        let removed = self.materializer.cleanup();
        let evicted = self.vfs.evict_content();
        debug!(repo = %self.repo, removed, evicted, "repository manager cleaned up");
        removed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for RepositoryManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl std::fmt::Debug for RepositoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryManager")
            .field("repo", &self.repo)
            .field("user", &self.caller.user_id)
            .field("files", &self.vfs.len())
            .field("load", &self.load.outcome)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Overlay view: reads see buffered writes, writes are buffered.
impl FileAccess for RepositoryManager {
    fn read(&self, file_path: &str) -> Option<Arc<str>> {
        self.read_file(file_path)
    }

    fn write(&mut self, file_path: &str, content: &str) -> VfsResult<()> {
        self.buffer_write(file_path, content).map_err(|e| match e {
            VcsError::InvalidPath(p) => VfsError::InvalidPath(p),
            other => VfsError::InvalidPath(other.to_string()),
        })
    }

    fn exists(&self, file_path: &str) -> bool {
        self.shim.exists(file_path)
    }

    /// Unchanged files keep the snapshot's surrogate; edited files get one
    /// that also depends on their current content.
    fn mtime(&self, file_path: &str) -> Option<u64> {
        let normalized = vrepo_vfs::path::normalize(file_path);
        let content = self.read_file(&normalized)?;
        if self.vfs.get_content(&normalized).as_deref() == Some(&*content) {
            return self.vfs.metadata(&normalized).map(|m| m.mtime);
        }
        let namespace = format!("{}@{}", self.vfs.namespace(), Digest::of(content.as_bytes()).short_hex());
        Some(ContentHasher::mtime_surrogate(&namespace, &normalized))
    }
}

async fn check_entitlement(
    services: &RepositoryServices,
    repo: &RepoId,
    caller: &Caller,
) -> SdkResult<()> {
    let Some(size) = services.origin.estimate_size(repo).await else {
        warn!(repo = %repo, "repository size unknown, allowing access");
        return Ok(());
    };
    match services.entitlements.validate_access(repo, size, caller).await {
        Ok(AccessDecision::Allow) => Ok(()),
        Ok(AccessDecision::Deny(reason)) => {
            info!(repo = %repo, user = %caller.user_id, %reason, "access denied");
            Err(SdkError::EntitlementDenied {
                repo: repo.clone(),
                reason,
            })
        }
        Err(e) => {
            warn!(repo = %repo, error = %e, "entitlement check unavailable, allowing access");
            Ok(())
        }
    }
}

async fn load_vfs(
    services: &RepositoryServices,
    repo: &RepoId,
) -> (Arc<VirtualFileSystem>, LoadReport) {
    let corrupt_reason = match services.snapshots.get(repo).await {
        SnapshotLookup::Hit(snapshot) => {
            let report = LoadReport {
                outcome: LoadOutcome::Cached,
                fetch_attempts: 0,
                corrupt_reason: None,
            };
            return (build_vfs(services, snapshot), report);
        }
        SnapshotLookup::Miss => None,
        SnapshotLookup::Corrupt { reason } => {
            if let Err(e) = services.snapshots.invalidate(repo).await {
                warn!(repo = %repo, error = %e, "failed to invalidate corrupt snapshot");
            }
            Some(reason)
        }
    };

    info!(repo = %repo, corrupt = corrupt_reason.is_some(), "fetching snapshot from origin");
    match recover(services, repo).await {
        Ok(snapshot) => (
            build_vfs(services, snapshot),
            LoadReport {
                outcome: LoadOutcome::Recovered,
                fetch_attempts: 1,
                corrupt_reason,
            },
        ),
        Err(reason) => {
            error!(repo = %repo, %reason, "snapshot recovery failed, serving empty repository");
            let vfs = VirtualFileSystem::empty(repo.as_str(), services.content_cache.clone());
            (
                Arc::new(vfs),
                LoadReport {
                    outcome: LoadOutcome::Degraded { reason },
                    fetch_attempts: 1,
                    corrupt_reason,
                },
            )
        }
    }
}

/// The single recovery attempt: fetch, validate, cache.
async fn recover(
    services: &RepositoryServices,
    repo: &RepoId,
) -> Result<Arc<RepositorySnapshot>, String> {
    let snapshot = services.origin.fetch(repo).await.map_err(|e| e.to_string())?;
    if snapshot.repo != *repo {
        return Err(format!("origin returned a snapshot of {}", snapshot.repo));
    }
    validate_snapshot(&snapshot).map_err(|defect| format!("fetched snapshot invalid: {defect}"))?;

    match services.snapshots.put_default(repo, &snapshot).await {
        Ok(()) => {
            if let Some(lifecycle) = &services.lifecycle {
                let key = SnapshotStore::key_for(repo);
                let ttl = services.snapshots.default_ttl();
                if let Err(e) = lifecycle.track(&key, snapshot.memory_size() as u64, ttl) {
                    debug!(error = %e, "snapshot not tracked");
                }
            }
        }
        Err(e) => warn!(repo = %repo, error = %e, "recovered snapshot not cached"),
    }
    Ok(Arc::new(snapshot))
}

fn build_vfs(services: &RepositoryServices, snapshot: Arc<RepositorySnapshot>) -> Arc<VirtualFileSystem> {
    Arc::new(VirtualFileSystem::new(snapshot, services.content_cache.clone()))
}

fn proposal_id(
    repo: &RepoId,
    session_id: &str,
    message: &str,
    files: &BTreeMap<String, Option<String>>,
) -> String {
    let mut parts: Vec<&[u8]> = vec![repo.as_str().as_bytes(), session_id.as_bytes(), message.as_bytes()];
    for (file_path, content) in files {
        parts.push(file_path.as_bytes());
        parts.push(content.as_deref().map_or(b"\0deleted".as_slice(), str::as_bytes));
    }
    ContentHasher::PROPOSAL.hash_parts(&parts).to_hex()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use vrepo_cache::CacheConfig;
    use vrepo_store::{InMemoryKeyValueStore, KeyValueStore};

    use crate::collaborators::TierSizeLimits;

    const CONTENT: &str = "FILE: a.py\nprint(1)\nFILE: b.py\nprint(2)";
    const TREE: &str = "a.py\nb.py";

    fn repo() -> RepoId {
        RepoId::new("octo/demo").unwrap()
    }

    #[derive(Default)]
    struct FixtureOrigin {
        snapshot: Option<(String, String)>,
        size: Option<u64>,
        fetches: AtomicU32,
    }

    impl FixtureOrigin {
        fn serving(content: &str, tree: &str) -> Self {
            Self {
                snapshot: Some((content.into(), tree.into())),
                ..Self::default()
            }
        }

        fn failing() -> Self {
            Self::default()
        }

        fn fetches(&self) -> u32 {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OriginFetcher for FixtureOrigin {
        async fn fetch(&self, repo: &RepoId) -> SdkResult<RepositorySnapshot> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            match &self.snapshot {
                Some((content, tree)) => Ok(RepositorySnapshot::new(repo.clone(), content.clone(), tree.clone())),
                None => Err(SdkError::Fetch {
                    repo: repo.clone(),
                    reason: "origin offline".into(),
                }),
            }
        }

        async fn estimate_size(&self, _repo: &RepoId) -> Option<u64> {
            self.size
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        calls: Mutex<Vec<ChangeSet>>,
    }

    #[async_trait]
    impl ChangePublisher for RecordingPublisher {
        async fn publish(&self, changes: &ChangeSet, _caller: &Caller) -> SdkResult<PublishReceipt> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(changes.clone());
            Ok(PublishReceipt {
                proposal_id: changes.proposal_id.clone(),
                reference: format!("proposal/{}", calls.len()),
            })
        }
    }

    struct Fixture {
        kv: Arc<InMemoryKeyValueStore>,
        origin: Arc<FixtureOrigin>,
        services: RepositoryServices,
    }

    fn fixture(origin: FixtureOrigin) -> Fixture {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let origin = Arc::new(origin);
        let snapshots = Arc::new(SnapshotStore::new(kv.clone(), Duration::from_secs(3600)));
        let cache = Arc::new(ContentCache::new(CacheConfig::default()));
        let services = RepositoryServices::new(snapshots, origin.clone(), cache);
        Fixture { kv, origin, services }
    }

    async fn open(f: &Fixture) -> RepositoryManager {
        RepositoryManager::open(f.services.clone(), repo(), Caller::new("alice").with_session("s1"))
            .await
            .unwrap()
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn miss_recovers_from_origin_and_caches() {
        let f = fixture(FixtureOrigin::serving(CONTENT, TREE));
        let manager = open(&f).await;
        assert_eq!(manager.load_report().outcome, LoadOutcome::Recovered);
        assert_eq!(manager.load_report().fetch_attempts, 1);
        assert_eq!(manager.vfs().list_directory(""), vec!["a.py", "b.py"]);
        assert_eq!(manager.read_file("a.py").as_deref(), Some("print(1)"));

        let again = open(&f).await;
        assert_eq!(again.load_report().outcome, LoadOutcome::Cached);
        assert_eq!(again.load_report().fetch_attempts, 0);
        assert_eq!(f.origin.fetches(), 1);
    }

    #[tokio::test]
    async fn corrupt_snapshot_gets_one_fetch_then_empty_vfs() {
        let f = fixture(FixtureOrigin::failing());
        let corrupt = RepositorySnapshot::new(repo(), "   ", "");
        let raw = serde_json_bytes(&corrupt);
        f.kv.set(&SnapshotStore::key_for(&repo()), raw, None).await.unwrap();

        let manager = open(&f).await;
        assert_eq!(f.origin.fetches(), 1);
        let report = manager.load_report();
        assert!(report.is_degraded());
        assert_eq!(report.fetch_attempts, 1);
        assert!(report.corrupt_reason.is_some());
        assert!(manager.vfs().is_empty());
        assert!(manager.vfs().list_directory("").is_empty());
        assert_eq!(manager.read_file("a.py"), None);
        assert!(f.kv.get(&SnapshotStore::key_for(&repo())).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_snapshot_recovers_when_origin_answers() {
        let f = fixture(FixtureOrigin::serving(CONTENT, TREE));
        let corrupt = RepositorySnapshot::new(repo(), "no headers here", "a.py");
        f.kv.set(&SnapshotStore::key_for(&repo()), serde_json_bytes(&corrupt), None)
            .await
            .unwrap();

        let manager = open(&f).await;
        assert_eq!(manager.load_report().outcome, LoadOutcome::Recovered);
        assert!(manager.load_report().corrupt_reason.is_some());
        assert_eq!(manager.read_file("b.py").as_deref(), Some("print(2)"));
    }

    #[tokio::test]
    async fn invalid_fetch_degrades_without_retry() {
        let f = fixture(FixtureOrigin::serving("", ""));
        let manager = open(&f).await;
        assert!(manager.load_report().is_degraded());
        assert_eq!(f.origin.fetches(), 1);
    }

    #[tokio::test]
    async fn recovered_snapshot_is_tracked_by_lifecycle() {
        let mut f = fixture(FixtureOrigin::serving(CONTENT, TREE));
        let lifecycle = CacheLifecycleManager::new(f.kv.clone(), Default::default());
        f.services = f.services.clone().with_lifecycle(lifecycle.clone());
        let _manager = open(&f).await;
        assert_eq!(lifecycle.memory_usage(), (CONTENT.len() + TREE.len()) as u64);
    }

    #[tokio::test]
    async fn warming_preloads_small_files() {
        let mut f = fixture(FixtureOrigin::serving(CONTENT, TREE));
        f.services = f.services.clone().with_warming(10, 1024);
        let manager = open(&f).await;
        assert_eq!(manager.vfs().stats().loaded_files, 2);
    }

    // ------------------------------------------------------------------
    // Entitlement
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn explicit_denial_blocks_open() {
        let mut f = fixture(FixtureOrigin {
            size: Some(10_000),
            ..FixtureOrigin::serving(CONTENT, TREE)
        });
        f.services = f
            .services
            .clone()
            .with_entitlements(Arc::new(TierSizeLimits::new().limit("free", 100)));
        let caller = Caller::new("bob").with_tier("free");
        let err = RepositoryManager::open(f.services.clone(), repo(), caller)
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::EntitlementDenied { .. }));
        assert_eq!(f.origin.fetches(), 0);
    }

    #[tokio::test]
    async fn unavailable_entitlement_data_allows() {
        let mut f = fixture(FixtureOrigin {
            size: Some(10_000),
            ..FixtureOrigin::serving(CONTENT, TREE)
        });
        f.services = f
            .services
            .clone()
            .with_entitlements(Arc::new(TierSizeLimits::new().limit("free", 100)));
        // No tier on the caller: the service cannot decide.
        let manager = open(&f).await;
        assert_eq!(manager.load_report().outcome, LoadOutcome::Recovered);

        // No size estimate at all.
        let f = fixture(FixtureOrigin::serving(CONTENT, TREE));
        assert!(RepositoryManager::open(f.services.clone(), repo(), Caller::new("x").with_tier("free"))
            .await
            .is_ok());
    }

    // ------------------------------------------------------------------
    // Buffered writes
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn writes_are_buffered_not_cached() {
        let f = fixture(FixtureOrigin::serving(CONTENT, TREE));
        let mut manager = open(&f).await;
        manager.write_file("a.py", "print(10)").unwrap();
        manager.write_file("new.py", "x = 1").unwrap();
        assert!(manager.delete_file("b.py").unwrap());
        assert!(!manager.delete_file("missing.py").unwrap());

        assert_eq!(manager.read_file("a.py").as_deref(), Some("print(10)"));
        assert_eq!(manager.vfs().get_content("a.py").as_deref(), Some("print(1)"));
        assert!(!manager.exists("b.py"));
        assert_eq!(manager.pending_changes(), vec!["a.py", "b.py", "new.py"]);

        let fresh = open(&f).await;
        assert_eq!(fresh.read_file("a.py").as_deref(), Some("print(1)"));
        assert!(fresh.pending_changes().is_empty());
    }

    #[tokio::test]
    async fn file_access_overlay() {
        let f = fixture(FixtureOrigin::serving(CONTENT, TREE));
        let mut manager = open(&f).await;
        let before = FileAccess::mtime(&manager, "a.py").unwrap();

        let access: &mut dyn FileAccess = &mut manager;
        access.write("a.py", "print(99)").unwrap();
        assert_eq!(access.read("a.py").as_deref(), Some("print(99)"));
        assert!(access.exists("a.py"));
        let after = access.mtime("a.py").unwrap();
        assert_ne!(before, after);
        assert_eq!(access.mtime("a.py"), Some(after));
        assert!(access.write("", "x").is_err());
        assert_eq!(access.mtime("nope.py"), None);
    }

    // ------------------------------------------------------------------
    // Publish
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn publish_is_idempotent_per_session() {
        let mut f = fixture(FixtureOrigin::serving(CONTENT, TREE));
        let publisher = Arc::new(RecordingPublisher::default());
        f.services = f.services.clone().with_publisher(publisher.clone());
        let mut manager = open(&f).await;

        assert_eq!(manager.publish("noop").await.unwrap(), PublishOutcome::NothingToPublish);
        manager.write_file("a.py", "print(3)").unwrap();

        let first = manager.publish("Update a").await.unwrap();
        let PublishOutcome::Published(receipt) = first else {
            panic!("expected a publish, got {first:?}");
        };
        assert_eq!(receipt.reference, "proposal/1");
        assert!(manager.pending_changes().is_empty());
        assert!(manager.shim().head().is_some());

        manager.write_file("b.py", "print(4)").unwrap();
        let second = manager.publish("Update b").await.unwrap();
        assert_eq!(second, PublishOutcome::Duplicate(receipt.clone()));

        // Same session through another manager.
        let mut other = open(&f).await;
        other.write_file("b.py", "print(5)").unwrap();
        assert_eq!(other.publish("again").await.unwrap(), PublishOutcome::Duplicate(receipt));

        let calls = publisher.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].files.get("a.py"), Some(&Some("print(3)".to_string())));
        assert_eq!(calls[0].diffs.len(), 1);
    }

    #[tokio::test]
    async fn new_session_may_publish_again() {
        let mut f = fixture(FixtureOrigin::serving(CONTENT, TREE));
        let publisher = Arc::new(RecordingPublisher::default());
        f.services = f.services.clone().with_publisher(publisher.clone());

        let mut first = open(&f).await;
        first.write_file("a.py", "1").unwrap();
        first.publish("one").await.unwrap();

        let caller = Caller::new("alice").with_session("s2");
        let mut second = RepositoryManager::open(f.services.clone(), repo(), caller).await.unwrap();
        second.write_file("a.py", "1").unwrap();
        let outcome = second.publish("one").await.unwrap();
        assert!(matches!(outcome, PublishOutcome::Published(_)));
        let calls = publisher.calls.lock().unwrap();
        assert_ne!(calls[0].proposal_id, calls[1].proposal_id);
    }

    #[tokio::test]
    async fn publish_without_publisher_is_an_error() {
        let f = fixture(FixtureOrigin::serving(CONTENT, TREE));
        let mut manager = open(&f).await;
        manager.write_file("a.py", "x").unwrap();
        assert!(matches!(manager.publish("m").await, Err(SdkError::Publish(_))));
        assert_eq!(manager.pending_changes(), vec!["a.py"]);
    }

    // ------------------------------------------------------------------
    // Materialization and cleanup
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn materialize_on_demand_and_cleanup_twice() {
        let f = fixture(FixtureOrigin::serving(CONTENT, TREE));
        let mut manager = open(&f).await;
        assert!(manager.scratch_dir().is_none());

        let a = manager.materialize("a.py").unwrap();
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "print(1)");
        assert!(manager.materialize("missing.py").is_none());

        manager.write_file("a.py", "print(7)").unwrap();
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "print(7)");

        let dir = manager.scratch_dir().unwrap().to_path_buf();
        assert_eq!(manager.cleanup(), 1);
        assert!(!dir.exists());
        assert_eq!(manager.cleanup(), 0);
        assert!(manager.is_closed());
    }

    #[tokio::test]
    async fn materialize_after_cleanup_is_refused() {
        let f = fixture(FixtureOrigin::serving(CONTENT, TREE));
        let mut manager = open(&f).await;
        manager.cleanup();
        assert!(manager.materialize("a.py").is_none());
        assert!(manager.scratch_dir().is_none());
        assert_eq!(manager.read_file("a.py").as_deref(), Some("print(1)"));
    }

    #[tokio::test]
    async fn drop_cleans_up() {
        let f = fixture(FixtureOrigin::serving(CONTENT, TREE));
        let dir = {
            let mut manager = open(&f).await;
            manager.materialize("b.py").unwrap();
            manager.scratch_dir().unwrap().to_path_buf()
        };
        assert!(!dir.exists());
    }

    fn serde_json_bytes(snapshot: &RepositorySnapshot) -> Vec<u8> {
        serde_json::to_vec(snapshot).unwrap()
    }
}
