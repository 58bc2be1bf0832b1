use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::TypeError;

/// Marker that opens every file section inside a snapshot content blob.
pub const FILE_HEADER_PREFIX: &str = "FILE:";

/// Identifier of a remotely hosted repository, e.g. `"octocat/hello-world"`.
///
/// Ids are case-preserving but must be non-empty, free of whitespace and
/// must not contain `:` (the cache key separator).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId(String);

impl RepoId {
    /// Validate and wrap a repository id.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty()
            || trimmed.contains(':')
            || trimmed.chars().any(char::is_whitespace)
        {
            return Err(TypeError::InvalidRepoId(id));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trailing component (`"hello-world"` for `"octocat/hello-world"`).
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// A filesystem-safe form used for scratch directories.
    pub fn slug(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect()
    }
}

impl fmt::Debug for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoId({})", self.0)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RepoId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RepoId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RepoId> for String {
    fn from(id: RepoId) -> Self {
        id.0
    }
}

/// Fetch metadata recorded alongside a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// When the origin fetch completed.
    pub fetched_at: DateTime<Utc>,
    /// Estimated repository size in bytes, as reported by the origin.
    pub estimated_size: u64,
    /// Free-form origin description (URL, branch, tool version).
    #[serde(default)]
    pub source: Option<String>,
}

impl SnapshotMetadata {
    pub fn new(estimated_size: u64) -> Self {
        Self {
            fetched_at: Utc::now(),
            estimated_size,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// A single fetched, point-in-time copy of a repository.
///
/// Snapshots are replaced wholesale on refresh and never partially mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    pub repo: RepoId,
    /// Monolithic content blob holding every file section.
    pub content: String,
    /// Raw tree listing of the repository.
    pub tree: String,
    pub metadata: SnapshotMetadata,
}

impl RepositorySnapshot {
    /// Build a snapshot whose estimated size is the content length.
    pub fn new(repo: RepoId, content: impl Into<String>, tree: impl Into<String>) -> Self {
        let content = content.into();
        let metadata = SnapshotMetadata::new(content.len() as u64);
        Self {
            repo,
            content,
            tree: tree.into(),
            metadata,
        }
    }

    pub fn with_metadata(mut self, metadata: SnapshotMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Bytes held in memory by this snapshot.
    pub fn memory_size(&self) -> usize {
        self.content.len() + self.tree.len()
    }
}

/// Location of one file inside a snapshot's content blob.
///
/// Derived once per snapshot and immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLocation {
    pub path: String,
    /// Byte offset of the first content byte.
    pub start: usize,
    /// Byte offset one past the last content byte.
    pub end: usize,
    pub size: u64,
    pub checksum: Digest,
}

impl FileLocation {
    /// Borrow this file's bytes out of the snapshot blob.
    ///
    /// Returns `None` if the offsets do not fall on valid boundaries of
    /// `content` (i.e. the location belongs to a different snapshot).
    pub fn slice<'a>(&self, content: &'a str) -> Option<&'a str> {
        content.get(self.start..self.end)
    }
}
