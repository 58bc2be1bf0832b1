//! High-level SDK for vrepo.
//!
//! Applications embed this crate to give agents and tools a file-system
//! view of a repository without cloning it, and to keep the caches behind
//! that view bounded.
//!
//! # Key Types
//!
//! - [`ServiceContext`] -- process-wide wiring built from a [`VrepoConfig`]
//! - [`RepositoryManager`] -- one caller's view of one repository: reads,
//!   buffered writes, publish, on-demand materialization
//! - [`OriginFetcher`], [`EntitlementService`], [`ChangePublisher`] --
//!   contracts the host implements
//!
//! # Failure model
//!
//! Opening a repository fails only when entitlement explicitly denies it.
//! A missing or corrupt snapshot triggers exactly one origin fetch; if that
//! fails too the caller gets an empty repository and a degraded
//! [`LoadReport`].

pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod manager;
pub mod materialize;

pub use collaborators::{
    AccessDecision, AllowAll, Caller, ChangePublisher, ChangeSet, EntitlementService,
    OriginFetcher, PublishReceipt, TierSizeLimits,
};
pub use config::{
    CacheSection, HealthSection, MemorySection, SchedulerSection, TtlSection, VrepoConfig,
};
pub use context::{ServiceContext, ServiceContextBuilder};
pub use error::{SdkError, SdkResult};
pub use manager::{LoadOutcome, LoadReport, PublishOutcome, RepositoryManager, RepositoryServices};
pub use materialize::Materializer;

// Re-export key types
pub use vrepo_lifecycle::{
    CleanupJob, HealthReport, HealthStatus, InvalidationReport, LifecycleStats, MemoryPressure,
    NavigationEvent, PageType,
};
pub use vrepo_types::{CacheCategory, RepoId, RepositorySnapshot};
pub use vrepo_vfs::{FileAccess, VirtualFileSystem};
