//! Error types for the version-control shim.

/// Errors that can occur during shim operations.
///
/// An empty commit is not an error; see
/// [`CommitOutcome::NothingToCommit`](crate::CommitOutcome::NothingToCommit).
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// The path is neither tracked nor present in the working overlay.
    #[error("pathspec did not match any file: {0}")]
    PathNotFound(String),

    /// The path matches an ignore rule and is not tracked.
    #[error("path is ignored: {0}")]
    Ignored(String),

    /// An invalid path was provided.
    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    /// An ignore pattern failed to compile.
    #[error("invalid ignore pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Convenience alias for shim results.
pub type VcsResult<T> = Result<T, VcsError>;
