//! Narrow file I/O interface for consumers that need "a file system".
//!
//! Tools that expect to read and write files depend on [`FileAccess`]
//! rather than on a concrete type. The VFS implements it read-only; a
//! writable overlay lives in the SDK's repository manager.

use std::sync::Arc;

use crate::error::{VfsError, VfsResult};
use crate::vfs::VirtualFileSystem;

/// The file operations consumers actually use.
pub trait FileAccess {
    /// File body, or `None` if absent.
    fn read(&self, path: &str) -> Option<Arc<str>>;

    /// Replace a file body.
    fn write(&mut self, path: &str, content: &str) -> VfsResult<()>;

    /// Whether a file or directory exists.
    fn exists(&self, path: &str) -> bool;

    /// Deterministic modification time in UNIX seconds.
    fn mtime(&self, path: &str) -> Option<u64>;
}

impl FileAccess for VirtualFileSystem {
    fn read(&self, path: &str) -> Option<Arc<str>> {
        self.get_content(path)
    }

    fn write(&mut self, path: &str, _content: &str) -> VfsResult<()> {
        Err(VfsError::ReadOnly(path.to_string()))
    }

    fn exists(&self, path: &str) -> bool {
        VirtualFileSystem::exists(self, path)
    }

    fn mtime(&self, path: &str) -> Option<u64> {
        self.metadata(path).map(|m| m.mtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrepo_cache::ContentCache;
    use vrepo_types::{RepoId, RepositorySnapshot};

    fn through_trait(access: &mut dyn FileAccess) -> (Option<Arc<str>>, bool, Option<u64>) {
        let read = access.read("a.py");
        let written = access.write("a.py", "x").is_ok();
        (read, written, access.mtime("a.py"))
    }

    #[test]
    fn vfs_is_read_only_through_trait() {
        let snapshot = RepositorySnapshot::new(RepoId::new("o/r").unwrap(), "FILE: a.py\n1", "a.py");
        let mut vfs = VirtualFileSystem::new(Arc::new(snapshot), Arc::new(ContentCache::default()));
        let (read, written, mtime) = through_trait(&mut vfs);
        assert_eq!(read.as_deref(), Some("1"));
        assert!(!written);
        assert!(mtime.is_some());
        assert!(FileAccess::exists(&vfs, "a.py"));
        assert_eq!(FileAccess::mtime(&vfs, "missing"), None);
    }
}
