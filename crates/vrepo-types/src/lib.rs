//! Foundation types for vrepo.
//!
//! This crate provides the identity, snapshot, hashing and timing types used
//! throughout the virtual repository stack. Every other vrepo crate depends
//! on `vrepo-types`.
//!
//! # Key Types
//!
//! - [`RepoId`] -- Identifier of a remotely hosted repository
//! - [`RepositorySnapshot`] -- Point-in-time content blob + tree listing
//! - [`FileLocation`] -- Byte range of one file inside a snapshot blob
//! - [`Digest`] -- BLAKE3 digest with hex helpers
//! - [`ContentHasher`] -- Domain-separated hashing for checksums and surrogates
//! - [`CacheCategory`] -- Key namespaces with independent TTL tiers
//! - [`Clock`] -- Monotonic time source (system or manually driven)

pub mod category;
pub mod clock;
pub mod digest;
pub mod error;
pub mod hash;
pub mod snapshot;

pub use category::CacheCategory;
pub use clock::{Clock, ManualClock, SystemClock, MAX_TTL};
pub use digest::Digest;
pub use error::TypeError;
pub use hash::ContentHasher;
pub use snapshot::{FILE_HEADER_PREFIX, FileLocation, RepoId, RepositorySnapshot, SnapshotMetadata};
