//! Virtual file system for vrepo.
//!
//! Turns a [`vrepo_types::RepositorySnapshot`] (content blob + tree listing)
//! into a path-addressable, read-only file tree without ever writing the
//! repository to disk.
//!
//! # Pipeline
//!
//! 1. [`TreeListing`] parses the raw tree listing (flat or box-drawn).
//! 2. [`ContentExtractor`] splits the blob into per-file [`vrepo_types::FileLocation`]s.
//! 3. [`FileIndexer`] builds lookup indices by path, name, extension,
//!    language, size bucket and directory.
//! 4. [`VirtualFileSystem`] synthesizes the directory tree and serves
//!    content lazily through a shared [`vrepo_cache::ContentCache`].

pub mod access;
pub mod directory;
pub mod error;
pub mod extract;
pub mod file;
pub mod indexer;
pub mod language;
pub mod listing;
pub mod path;
pub mod vfs;

pub use access::FileAccess;
pub use directory::{DirectoryTree, NodeKind, VirtualDirectory};
pub use error::{VfsError, VfsResult};
pub use extract::{ContentExtractor, Extraction, ExtractionReport};
pub use file::{DirEntry, FileMetadata, VirtualFile};
pub use indexer::{FileIndexer, IndexedFile, SearchFilters};
pub use language::SizeBucket;
pub use listing::{ListingEntry, TreeListing};
pub use vfs::{VfsStats, VirtualFileSystem};
