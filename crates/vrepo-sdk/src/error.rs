use thiserror::Error;
use vrepo_types::RepoId;

/// Errors surfaced by the SDK.
///
/// Loading a repository only ever fails with [`SdkError::EntitlementDenied`];
/// every other load problem degrades to a usable, possibly empty, view.
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("access to {repo} denied: {reason}")]
    EntitlementDenied { repo: RepoId, reason: String },

    #[error("origin fetch failed for {repo}: {reason}")]
    Fetch { repo: RepoId, reason: String },

    #[error("entitlement data unavailable: {0}")]
    EntitlementUnavailable(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] vrepo_store::StoreError),

    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] vrepo_lifecycle::LifecycleError),

    #[error("version control error: {0}")]
    Vcs(#[from] vrepo_vcs::VcsError),

    #[error("file system error: {0}")]
    Vfs(#[from] vrepo_vfs::VfsError),
}

pub type SdkResult<T> = Result<T, SdkError>;
