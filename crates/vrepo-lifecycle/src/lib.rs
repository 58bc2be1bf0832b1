//! Cache lifecycle management for vrepo.
//!
//! Everything the hosting application caches on behalf of a user lives in
//! one of four key categories (see [`vrepo_types::CacheCategory`]), each
//! with its own TTL tier. This crate keeps those caches bounded in time
//! and memory.
//!
//! # Key Types
//!
//! - [`CacheLifecycleManager`] -- category TTLs, expiry sweep, memory pressure, stats, health
//! - [`NavigationInvalidator`] -- clears categories when users move between pages
//! - [`CleanupScheduler`] -- periodic sweep, optimization and health jobs
//! - [`MemoryPressure`] -- Low/Medium/High/Critical usage levels
//!
//! # Rules
//!
//! 1. A write that pushes memory to `High` asks for a background relief
//!    pass; it never waits for one, and only one runs at a time.
//! 2. A scheduled job never overlaps with itself.
//! 3. Store failures are logged and counted toward health; reads degrade
//!    to misses.

pub mod error;
pub mod health;
pub mod manager;
pub mod navigation;
pub mod pressure;
pub mod scheduler;

pub use error::{LifecycleError, LifecycleResult};
pub use health::{HealthReport, HealthStatus, HealthThresholds};
pub use manager::{
    CacheLifecycleManager, CategoryStats, CategoryTtls, LifecycleConfig, LifecycleStats,
    OptimizeReport, SweepReport,
};
pub use navigation::{
    InvalidationReport, NavigationEvent, NavigationInvalidator, PageType, Section,
    TransitionTable, DEFAULT_HISTORY_LIMIT,
};
pub use pressure::{MemoryPressure, MemoryPressureThresholds};
pub use scheduler::{CleanupJob, CleanupJobResult, CleanupScheduler, JobStats, SchedulerConfig};
