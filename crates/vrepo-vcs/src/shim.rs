//! Simulated version control over a virtual file system.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use vrepo_types::ContentHasher;
use vrepo_vfs::{path, VirtualFileSystem};

use crate::diff::{diff_text, FileDiff};
use crate::error::{VcsError, VcsResult};
use crate::handle::{RemoteRef, RepositoryHandle};
use crate::ignore::IgnoreRules;
use crate::status::{FileStatus, RepoStatus, StatusEntry};

/// Length of a synthetic commit id in hex characters.
const COMMIT_ID_LEN: usize = 40;

/// The capability set tooling expects from a repository.
pub trait VersionControl {
    /// Tracked paths, sorted.
    fn list_tracked(&self) -> Vec<String>;

    fn status(&self) -> RepoStatus;

    /// Stage paths. Returns the paths whose staged state changed.
    fn add(&mut self, paths: &[&str]) -> VcsResult<Vec<String>>;

    /// Record the staged set. An empty staged set is not an error.
    fn commit(&mut self, message: &str) -> CommitOutcome;

    /// Diff of one path between the last commit and the working overlay.
    fn diff(&self, path: &str) -> Option<FileDiff>;
}

/// A synthetic commit. Nothing is persisted beyond `head`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub id: String,
    pub message: String,
    pub files: Vec<String>,
    /// Monotonic per-shim sequence number.
    pub sequence: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommitOutcome {
    Committed(CommitInfo),
    NothingToCommit,
}

impl CommitOutcome {
    pub fn commit(&self) -> Option<&CommitInfo> {
        match self {
            CommitOutcome::Committed(info) => Some(info),
            CommitOutcome::NothingToCommit => None,
        }
    }
}

/// Overlay-backed [`VersionControl`] implementation.
///
/// The VFS is never mutated. Working content lives in `overlay` (`None`
/// marks a deletion); content recorded by a synthetic commit lives in
/// `committed` and shadows the snapshot for later diffs.
pub struct VcsShim {
    vfs: Arc<VirtualFileSystem>,
    handle: RepositoryHandle,
    ignore: IgnoreRules,
    overlay: BTreeMap<String, Option<Arc<str>>>,
    committed: BTreeMap<String, Option<Arc<str>>>,
    sequence: u64,
    head: Option<CommitInfo>,
}

impl VcsShim {
    /// Track every VFS file, with nothing staged or modified.
    pub fn new(vfs: Arc<VirtualFileSystem>) -> Self {
        Self::with_ignore(vfs, IgnoreRules::default())
    }

    pub fn with_ignore(vfs: Arc<VirtualFileSystem>, ignore: IgnoreRules) -> Self {
        let handle = RepositoryHandle::new(vfs.tree(), Some(RemoteRef::origin(vfs.namespace())));
        debug!(repo = %vfs.namespace(), tracked = handle.tracked.len(), "vcs shim initialized");
        Self {
            vfs,
            handle,
            ignore,
            overlay: BTreeMap::new(),
            committed: BTreeMap::new(),
            sequence: 0,
            head: None,
        }
    }

    pub fn handle(&self) -> &RepositoryHandle {
        &self.handle
    }

    pub fn head(&self) -> Option<&CommitInfo> {
        self.head.as_ref()
    }

    pub fn current_branch(&self) -> &str {
        &self.handle.branch
    }

    pub fn remote(&self) -> Option<&RemoteRef> {
        self.handle.remote.as_ref()
    }

    pub fn is_ignored(&self, file_path: &str) -> bool {
        self.ignore.is_ignored(&path::normalize(file_path))
    }

    /// Working content: the overlay first, then the committed baseline.
    pub fn read(&self, file_path: &str) -> Option<Arc<str>> {
        let file_path = path::normalize(file_path);
        match self.overlay.get(&file_path) {
            Some(entry) => entry.clone(),
            None => self.base_content(&file_path),
        }
    }

    /// Whether a path exists in the working overlay view.
    pub fn exists(&self, file_path: &str) -> bool {
        let file_path = path::normalize(file_path);
        match self.overlay.get(&file_path) {
            Some(entry) => entry.is_some(),
            None => self.base_exists(&file_path),
        }
    }

    /// Paths with pending changes in the working overlay, sorted.
    pub fn changed_paths(&self) -> Vec<String> {
        self.overlay
            .iter()
            .filter(|(p, content)| **content != self.base_content(p))
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Record a buffered write.
    pub fn record_write(&mut self, file_path: &str, content: impl Into<Arc<str>>) -> VcsResult<()> {
        let file_path = checked(file_path)?;
        let content = content.into();
        let matches_base = self.base_content(&file_path).as_deref() == Some(&*content);
        self.overlay.insert(file_path.clone(), Some(content));
        self.handle.deleted.remove(&file_path);

        if self.handle.is_tracked(&file_path) {
            if matches_base {
                self.handle.modified.remove(&file_path);
            } else {
                self.handle.modified.insert(file_path.clone());
            }
        } else {
            self.handle.untracked.insert(file_path.clone());
        }
        debug!(path = %file_path, "write recorded");
        Ok(())
    }

    /// Record a buffered delete. Returns `false` if the path did not exist.
    pub fn record_delete(&mut self, file_path: &str) -> VcsResult<bool> {
        let file_path = checked(file_path)?;
        if !self.exists(&file_path) {
            return Ok(false);
        }
        if self.handle.is_tracked(&file_path) {
            self.overlay.insert(file_path.clone(), None);
            self.handle.modified.remove(&file_path);
            self.handle.deleted.insert(file_path.clone());
        } else {
            self.overlay.remove(&file_path);
            self.handle.clear_path(&file_path);
        }
        debug!(path = %file_path, "delete recorded");
        Ok(true)
    }

    /// Stage every pending change that is not ignored.
    pub fn add_all(&mut self) -> Vec<String> {
        let candidates: Vec<String> = self
            .handle
            .modified
            .iter()
            .chain(&self.handle.deleted)
            .chain(self.handle.untracked.iter().filter(|p| !self.ignore.is_ignored(p)))
            .cloned()
            .collect();
        let refs: Vec<&str> = candidates.iter().map(String::as_str).collect();
        self.add(&refs).unwrap_or_default()
    }

    /// Unstage paths, returning them to modified/untracked/deleted.
    pub fn reset(&mut self, paths: &[&str]) -> Vec<String> {
        let mut unstaged = Vec::new();
        for raw in paths {
            let file_path = path::normalize(raw);
            if !self.handle.staged.remove(&file_path) {
                continue;
            }
            let working = self.overlay.get(&file_path).cloned();
            match working {
                Some(None) => {
                    self.handle.deleted.insert(file_path.clone());
                }
                Some(Some(_)) if !self.base_exists(&file_path) => {
                    self.handle.tracked.remove(&file_path);
                    self.handle.untracked.insert(file_path.clone());
                }
                Some(Some(content)) => {
                    if self.base_content(&file_path).as_deref() != Some(&*content) {
                        self.handle.modified.insert(file_path.clone());
                    }
                }
                None => {}
            }
            unstaged.push(file_path);
        }
        unstaged
    }

    /// Diffs for every changed path.
    pub fn diff_all(&self) -> Vec<FileDiff> {
        self.changed_paths()
            .iter()
            .filter_map(|p| self.diff(p))
            .filter(|d| !d.is_empty())
            .collect()
    }

    fn staged_status(&self, file_path: &str) -> FileStatus {
        match self.overlay.get(file_path) {
            Some(None) => FileStatus::Deleted,
            _ if !self.base_exists(file_path) => FileStatus::New,
            _ => FileStatus::Modified,
        }
    }

    fn base_content(&self, file_path: &str) -> Option<Arc<str>> {
        match self.committed.get(file_path) {
            Some(entry) => entry.clone(),
            None if self.vfs.indexer().exists(file_path) => self.vfs.get_content(file_path),
            None => None,
        }
    }

    fn base_exists(&self, file_path: &str) -> bool {
        match self.committed.get(file_path) {
            Some(entry) => entry.is_some(),
            None => self.vfs.indexer().exists(file_path),
        }
    }

    fn commit_id(&self, message: &str, sequence: u64, files: &[String]) -> String {
        let joined = files.join("\n");
        let digest = ContentHasher::COMMIT.hash_parts(&[
            message.as_bytes(),
            &sequence.to_le_bytes(),
            self.vfs.namespace().as_bytes(),
            joined.as_bytes(),
        ]);
        digest.to_hex()[..COMMIT_ID_LEN].to_string()
    }
}

impl VersionControl for VcsShim {
    fn list_tracked(&self) -> Vec<String> {
        self.handle.tracked.iter().cloned().collect()
    }

    fn status(&self) -> RepoStatus {
        RepoStatus {
            branch: self.handle.branch.clone(),
            tracked: self.handle.tracked.len(),
            staged: self
                .handle
                .staged
                .iter()
                .map(|p| StatusEntry::new(p.clone(), self.staged_status(p)))
                .collect(),
            modified: self.handle.modified.iter().cloned().collect(),
            untracked: self.handle.untracked.iter().cloned().collect(),
            deleted: self
                .handle
                .deleted
                .iter()
                .filter(|p| !self.handle.staged.contains(*p))
                .cloned()
                .collect(),
        }
    }

    /// All paths are validated before any is staged.
    fn add(&mut self, paths: &[&str]) -> VcsResult<Vec<String>> {
        let mut targets = BTreeSet::new();
        for raw in paths {
            let file_path = checked(raw)?;
            let known = self.handle.is_tracked(&file_path)
                || self.handle.untracked.contains(&file_path);
            if !known {
                return Err(VcsError::PathNotFound(file_path));
            }
            if !self.handle.is_tracked(&file_path) && self.ignore.is_ignored(&file_path) {
                return Err(VcsError::Ignored(file_path));
            }
            targets.insert(file_path);
        }

        let mut changed = Vec::new();
        for file_path in targets {
            let pending = self.handle.modified.remove(&file_path)
                | self.handle.untracked.remove(&file_path)
                | self.handle.deleted.contains(&file_path);
            if !pending {
                continue;
            }
            self.handle.tracked.insert(file_path.clone());
            if self.handle.staged.insert(file_path.clone()) {
                changed.push(file_path);
            }
        }
        debug!(staged = changed.len(), "paths staged");
        Ok(changed)
    }

    fn commit(&mut self, message: &str) -> CommitOutcome {
        if self.handle.staged.is_empty() {
            debug!("nothing to commit");
            return CommitOutcome::NothingToCommit;
        }

        let files: Vec<String> = std::mem::take(&mut self.handle.staged).into_iter().collect();
        for file_path in &files {
            let Some(working) = self.overlay.get(file_path).cloned() else {
                continue;
            };
            if working.is_none() {
                self.handle.tracked.remove(file_path);
                self.handle.deleted.remove(file_path);
            }
            self.committed.insert(file_path.clone(), working);
            if !self.handle.modified.contains(file_path) {
                self.overlay.remove(file_path);
            }
        }

        self.sequence += 1;
        let info = CommitInfo {
            id: self.commit_id(message, self.sequence, &files),
            message: message.to_string(),
            files,
            sequence: self.sequence,
        };
        info!(id = %info.id, files = info.files.len(), "synthetic commit recorded");
        self.head = Some(info.clone());
        CommitOutcome::Committed(info)
    }

    fn diff(&self, file_path: &str) -> Option<FileDiff> {
        let file_path = path::normalize(file_path);
        let old = self.base_content(&file_path);
        let new = self.read(&file_path);
        if old.is_none() && new.is_none() {
            return None;
        }
        Some(diff_text(&file_path, old.as_deref(), new.as_deref()))
    }
}

impl std::fmt::Debug for VcsShim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VcsShim")
            .field("repo", &self.vfs.namespace())
            .field("tracked", &self.handle.tracked.len())
            .field("staged", &self.handle.staged.len())
            .field("head", &self.head.as_ref().map(|h| &h.id))
            .finish()
    }
}

fn checked(raw: &str) -> VcsResult<String> {
    let normalized = path::normalize(raw);
    if normalized.is_empty() {
        warn!(path = %raw, "rejected empty path");
        return Err(VcsError::InvalidPath(raw.to_string()));
    }
    Ok(normalized)
}
