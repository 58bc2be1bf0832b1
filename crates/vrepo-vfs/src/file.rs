use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use vrepo_types::{ContentHasher, Digest, FileLocation};

use crate::directory::NodeKind;
use crate::indexer::IndexedFile;
use crate::language;

/// A file inside the virtual file system.
///
/// The body is never stored here: it is sliced out of the snapshot on first
/// read and kept in the shared content cache. `content_loaded` records that
/// this happened at least once.
#[derive(Debug)]
pub struct VirtualFile {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub language: &'static str,
    pub extension: Option<String>,
    pub location: FileLocation,
    content_loaded: AtomicBool,
}

impl VirtualFile {
    pub fn new(location: FileLocation) -> Self {
        let record = IndexedFile::new(&location.path, location.size);
        Self {
            path: record.path,
            name: record.name,
            size: record.size,
            language: record.language,
            extension: record.extension,
            location,
            content_loaded: AtomicBool::new(false),
        }
    }

    pub fn is_content_loaded(&self) -> bool {
        self.content_loaded.load(Ordering::Acquire)
    }

    pub(crate) fn mark_loaded(&self) {
        self.content_loaded.store(true, Ordering::Release);
    }

    /// Binary by extension table only; see [`language::looks_binary`] for
    /// the content check.
    pub fn has_binary_extension(&self) -> bool {
        self.extension
            .as_deref()
            .is_some_and(language::is_binary_extension)
    }

    pub fn checksum(&self) -> &Digest {
        &self.location.checksum
    }

    pub fn index_record(&self) -> IndexedFile {
        IndexedFile::new(&self.path, self.size)
    }
}

/// `stat`-like view of a file or directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileMetadata {
    pub path: String,
    pub kind: NodeKind,
    pub size: u64,
    pub language: Option<&'static str>,
    pub is_binary: bool,
    /// Deterministic stand-in for a modification time, in UNIX seconds.
    pub mtime: u64,
    pub checksum: Option<Digest>,
}

impl FileMetadata {
    pub(crate) fn for_file(namespace: &str, file: &VirtualFile, is_binary: bool) -> Self {
        Self {
            path: file.path.clone(),
            kind: NodeKind::File,
            size: file.size,
            language: Some(file.language),
            is_binary,
            mtime: ContentHasher::mtime_surrogate(namespace, &file.path),
            checksum: Some(file.location.checksum),
        }
    }

    pub(crate) fn for_directory(namespace: &str, dir_path: &str) -> Self {
        Self {
            path: dir_path.to_string(),
            kind: NodeKind::Directory,
            size: 0,
            language: None,
            is_binary: false,
            mtime: ContentHasher::mtime_surrogate(namespace, dir_path),
            checksum: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// One row of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub kind: NodeKind,
    /// File size; `None` for directories.
    pub size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(path: &str, size: u64) -> FileLocation {
        FileLocation {
            path: path.into(),
            start: 0,
            end: size as usize,
            size,
            checksum: Digest::of(b"x"),
        }
    }

    #[test]
    fn file_fields_follow_path() {
        let f = VirtualFile::new(location("assets/logo.PNG", 10));
        assert_eq!(f.name, "logo.PNG");
        assert_eq!(f.extension.as_deref(), Some("png"));
        assert!(f.has_binary_extension());
        assert!(!f.is_content_loaded());
        f.mark_loaded();
        assert!(f.is_content_loaded());
    }

    #[test]
    fn metadata_mtime_is_stable() {
        let f = VirtualFile::new(location("src/a.rs", 3));
        let a = FileMetadata::for_file("repo:x", &f, false);
        let b = FileMetadata::for_file("repo:x", &f, false);
        assert_eq!(a.mtime, b.mtime);
        assert_eq!(a.language, Some("rust"));
        assert!(!a.is_dir());
        assert!(FileMetadata::for_directory("repo:x", "src").is_dir());
    }
}
