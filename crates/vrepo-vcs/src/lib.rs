//! Version-control compatibility shim for vrepo.
//!
//! Tooling written against a checked-out repository expects status, staging
//! and commits. [`VcsShim`] simulates those on top of a
//! [`vrepo_vfs::VirtualFileSystem`]: every snapshot file starts tracked and
//! clean, writes land in an in-memory working overlay, and commits produce
//! synthetic identifiers without persisting any history.
//!
//! Consumers depend on the [`VersionControl`] trait, not on the shim.
//!
//! # Key Types
//!
//! - [`VersionControl`] -- list_tracked / status / add / commit / diff
//! - [`VcsShim`] -- the overlay-backed implementation
//! - [`RepositoryHandle`] -- tracked/modified/staged/untracked bookkeeping
//! - [`RepoStatus`], [`CommitOutcome`], [`FileDiff`]
//! - [`IgnoreRules`] -- fixed ignore-pattern list

pub mod diff;
pub mod error;
pub mod handle;
pub mod ignore;
pub mod shim;
pub mod status;

pub use diff::{diff_text, DiffHunk, DiffLine, FileDiff};
pub use error::{VcsError, VcsResult};
pub use handle::{RemoteRef, RepositoryHandle, DEFAULT_BRANCH};
pub use ignore::{IgnoreRules, DEFAULT_IGNORE_PATTERNS};
pub use shim::{CommitInfo, CommitOutcome, VcsShim, VersionControl};
pub use status::{FileStatus, RepoStatus, StatusEntry};
