//! Working overlay status types.

use serde::Serialize;

/// Status of the working overlay relative to the last synthetic commit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RepoStatus {
    pub branch: String,
    pub tracked: usize,
    /// Changes that the next commit would record.
    pub staged: Vec<StatusEntry>,
    /// Tracked files changed since they were last staged or committed.
    pub modified: Vec<String>,
    pub untracked: Vec<String>,
    /// Tracked files deleted but not yet staged.
    pub deleted: Vec<String>,
}

impl RepoStatus {
    /// No pending changes of any kind.
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty()
            && self.modified.is_empty()
            && self.untracked.is_empty()
            && self.deleted.is_empty()
    }

    pub fn has_staged_changes(&self) -> bool {
        !self.staged.is_empty()
    }

    pub fn total_entries(&self) -> usize {
        self.staged.len() + self.modified.len() + self.untracked.len() + self.deleted.len()
    }
}

/// A staged change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub path: String,
    pub status: FileStatus,
}

impl StatusEntry {
    pub fn new(path: impl Into<String>, status: FileStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    New,
    Modified,
    Deleted,
}

impl FileStatus {
    /// Single-letter code as printed by `status --short`.
    pub fn code(self) -> char {
        match self {
            FileStatus::New => 'A',
            FileStatus::Modified => 'M',
            FileStatus::Deleted => 'D',
        }
    }
}
