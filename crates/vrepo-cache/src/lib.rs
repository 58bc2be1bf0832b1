//! Bounded content cache for vrepo.
//!
//! [`ContentCache`] is an LRU cache bounded by both entry count and total
//! byte size, with a per-entry TTL. It backs lazy file content loading in
//! the virtual file system.
//!
//! # Invariants
//!
//! 1. After any mutation, `len() <= max_entries` and
//!    `total_bytes() <= max_bytes`.
//! 2. An expired entry is never returned; it is evicted on the read that
//!    observes it, or by [`ContentCache::cleanup_expired`].
//! 3. Exceeding a bound is never an error: least-recently-used entries are
//!    evicted until the new entry fits. A value larger than the whole byte
//!    budget is not cached at all.

pub mod cache;
pub mod stats;

pub use cache::{CacheConfig, ContentCache};
pub use stats::CacheStats;
