use vrepo_store::StoreError;

/// Errors from lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// A key did not start with any known category prefix.
    #[error("key {0:?} does not belong to a cache category")]
    UnknownCategory(String),

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// `start` was called on a scheduler that is already running.
    #[error("cleanup scheduler is already running")]
    SchedulerRunning,
}

/// Result alias for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;
