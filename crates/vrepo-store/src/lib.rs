//! Key-value storage for vrepo.
//!
//! The hosting application keeps snapshots and per-user state in a remote
//! key-value cache. This crate defines the narrow contract the core needs
//! from that cache and the snapshot layer built on top of it.
//!
//! # Components
//!
//! - [`KeyValueStore`] -- async get/set/delete/expire/prefix primitives
//! - [`InMemoryKeyValueStore`] -- `HashMap`-backed store for tests and embedding
//! - [`SnapshotStore`] -- keyed snapshot get/put/invalidate with validation
//!
//! # Design Rules
//!
//! 1. Snapshots are replaced wholesale, never patched in place.
//! 2. A structurally invalid snapshot is [`SnapshotLookup::Corrupt`], which is
//!    a different signal from [`SnapshotLookup::Miss`].
//! 3. Transient store failures are logged and reported as a miss; they never
//!    escape [`SnapshotStore::get`].
//! 4. Bulk invalidation goes through prefix deletion, not per-key scans by
//!    the caller.

pub mod error;
pub mod memory;
pub mod snapshot;
pub mod traits;
pub mod validation;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryKeyValueStore;
pub use snapshot::{SnapshotLookup, SnapshotStore};
pub use traits::KeyValueStore;
pub use validation::{validate_snapshot, SnapshotDefect};
