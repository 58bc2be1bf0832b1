//! Error types for the virtual file system.

/// Errors that can occur during virtual file system operations.
///
/// Absent paths are not errors: lookups return `None` or empty collections.
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    /// A glob or search pattern failed to compile.
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The file system does not accept writes.
    #[error("virtual file system is read-only: {0}")]
    ReadOnly(String),

    /// A path could not be normalized.
    #[error("invalid path: {0:?}")]
    InvalidPath(String),
}

/// Convenience alias for VFS results.
pub type VfsResult<T> = Result<T, VfsError>;
