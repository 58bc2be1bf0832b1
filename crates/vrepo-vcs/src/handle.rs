use std::collections::BTreeSet;

use serde::Serialize;

/// Branch name reported by the shim.
pub const DEFAULT_BRANCH: &str = "main";

/// Remote the snapshot was fetched from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RemoteRef {
    pub name: String,
    pub url: String,
}

impl RemoteRef {
    /// The `origin` remote for a repository namespace.
    pub fn origin(namespace: &str) -> Self {
        Self {
            name: "origin".to_string(),
            url: format!("vrepo://{namespace}"),
        }
    }
}

/// Path bookkeeping behind the shim.
///
/// Starts fully tracked and clean. A path can be staged and modified at the
/// same time (written again after `add`); every other set is disjoint from
/// `untracked`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryHandle {
    pub tracked: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub staged: BTreeSet<String>,
    pub untracked: BTreeSet<String>,
    /// Tracked paths removed from the working overlay.
    pub deleted: BTreeSet<String>,
    pub branch: String,
    pub remote: Option<RemoteRef>,
}

impl RepositoryHandle {
    pub fn new<I>(tracked: I, remote: Option<RemoteRef>) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            tracked: tracked.into_iter().collect(),
            branch: DEFAULT_BRANCH.to_string(),
            remote,
            ..Self::default()
        }
    }

    pub fn is_tracked(&self, path: &str) -> bool {
        self.tracked.contains(path)
    }

    /// Whether the path has any pending change (staged or not).
    pub fn is_dirty(&self, path: &str) -> bool {
        self.modified.contains(path)
            || self.staged.contains(path)
            || self.untracked.contains(path)
            || self.deleted.contains(path)
    }

    /// Forget every pending change to `path`.
    pub(crate) fn clear_path(&mut self, path: &str) {
        self.modified.remove(path);
        self.staged.remove(path);
        self.untracked.remove(path);
        self.deleted.remove(path);
    }
}
