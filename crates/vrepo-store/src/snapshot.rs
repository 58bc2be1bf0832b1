use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use vrepo_types::{CacheCategory, RepoId, RepositorySnapshot};

use crate::error::{StoreError, StoreResult};
use crate::traits::KeyValueStore;
use crate::validation::validate_snapshot;

/// Result of looking up a snapshot.
#[derive(Clone, Debug)]
pub enum SnapshotLookup {
    /// A structurally valid snapshot was found.
    Hit(Arc<RepositorySnapshot>),
    /// No snapshot is cached, or the store could not be reached.
    Miss,
    /// A cached entry exists but failed decoding or validation.
    Corrupt { reason: String },
}

impl SnapshotLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, SnapshotLookup::Hit(_))
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, SnapshotLookup::Corrupt { .. })
    }
}

/// Snapshot storage over a remote key-value cache.
///
/// Snapshots live under `repo:{repo_id}` in the repository category and are
/// serialized as JSON.
pub struct SnapshotStore {
    kv: Arc<dyn KeyValueStore>,
    default_ttl: Duration,
}

impl SnapshotStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, default_ttl: Duration) -> Self {
        Self { kv, default_ttl }
    }

    /// The cache key used for a repository's snapshot.
    pub fn key_for(repo: &RepoId) -> String {
        CacheCategory::repository_key(repo.as_str())
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Fetch and validate a snapshot.
    ///
    /// Store failures are logged and reported as [`SnapshotLookup::Miss`].
    pub async fn get(&self, repo: &RepoId) -> SnapshotLookup {
        let key = Self::key_for(repo);
        let raw = match self.kv.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(repo = %repo, "snapshot cache miss");
                return SnapshotLookup::Miss;
            }
            Err(e) => {
                warn!(repo = %repo, error = %e, "snapshot store unavailable, treating as miss");
                return SnapshotLookup::Miss;
            }
        };

        let snapshot: RepositorySnapshot = match serde_json::from_slice(&raw) {
            Ok(s) => s,
            Err(e) => {
                warn!(repo = %repo, error = %e, "cached snapshot failed to decode");
                return SnapshotLookup::Corrupt {
                    reason: format!("undecodable snapshot: {e}"),
                };
            }
        };

        if snapshot.repo != *repo {
            warn!(repo = %repo, cached = %snapshot.repo, "cached snapshot belongs to another repository");
            return SnapshotLookup::Corrupt {
                reason: format!("snapshot is for {}", snapshot.repo),
            };
        }

        match validate_snapshot(&snapshot) {
            Ok(()) => {
                debug!(repo = %repo, bytes = raw.len(), "snapshot cache hit");
                SnapshotLookup::Hit(Arc::new(snapshot))
            }
            Err(defect) => {
                warn!(repo = %repo, %defect, "cached snapshot is corrupt");
                SnapshotLookup::Corrupt {
                    reason: defect.to_string(),
                }
            }
        }
    }

    /// Store a snapshot under the repository key with the given TTL.
    pub async fn put(
        &self,
        repo: &RepoId,
        snapshot: &RepositorySnapshot,
        ttl: Duration,
    ) -> StoreResult<()> {
        let raw = serde_json::to_vec(snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let bytes = raw.len();
        self.kv.set(&Self::key_for(repo), raw, Some(ttl)).await?;
        info!(repo = %repo, bytes, ttl_secs = ttl.as_secs(), "snapshot cached");
        Ok(())
    }

    /// Store a snapshot with the default repository TTL.
    pub async fn put_default(&self, repo: &RepoId, snapshot: &RepositorySnapshot) -> StoreResult<()> {
        self.put(repo, snapshot, self.default_ttl).await
    }

    /// Drop a repository's snapshot. Returns `true` if one was cached.
    pub async fn invalidate(&self, repo: &RepoId) -> StoreResult<bool> {
        let removed = self.kv.delete(&Self::key_for(repo)).await?;
        if removed {
            info!(repo = %repo, "snapshot invalidated");
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}
