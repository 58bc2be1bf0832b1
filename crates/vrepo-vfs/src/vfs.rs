//! The virtual file system over one repository snapshot.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use globset::GlobBuilder;
use serde::Serialize;
use tracing::{debug, info};
use vrepo_cache::ContentCache;
use vrepo_types::RepositorySnapshot;

use crate::directory::{DirectoryTree, NodeKind};
use crate::error::{VfsError, VfsResult};
use crate::extract::{ContentExtractor, ExtractionReport};
use crate::file::{DirEntry, FileMetadata, VirtualFile};
use crate::indexer::{FileIndexer, IndexedFile, SearchFilters};
use crate::language;
use crate::listing::TreeListing;
use crate::path;

/// Summary counters for one VFS.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VfsStats {
    pub files: usize,
    pub directories: usize,
    pub total_bytes: u64,
    pub languages: BTreeMap<String, usize>,
    /// Bodies sliced out of the snapshot (cache misses plus warm-ups).
    pub extractions: u64,
    pub loaded_files: usize,
    pub extraction: ExtractionReport,
}

/// Read-only, path-addressable view of a repository snapshot.
///
/// Built once per snapshot. File bodies are loaded lazily on
/// [`VirtualFileSystem::get_content`] and held only in the shared
/// [`ContentCache`], under keys scoped to this snapshot's generation so two
/// snapshots of the same repository never serve each other's content.
pub struct VirtualFileSystem {
    namespace: String,
    generation: String,
    snapshot: Option<Arc<RepositorySnapshot>>,
    files: HashMap<String, VirtualFile>,
    tree: DirectoryTree,
    indexer: FileIndexer,
    cache: Arc<ContentCache>,
    report: ExtractionReport,
    extractions: AtomicU64,
}

impl VirtualFileSystem {
    /// Extract, index and build the directory tree for a snapshot.
    pub fn new(snapshot: Arc<RepositorySnapshot>, cache: Arc<ContentCache>) -> Self {
        let listing = TreeListing::parse(&snapshot.tree);
        let extraction = ContentExtractor::extract(&snapshot.content, &listing);

        let indexer = FileIndexer::new();
        let mut files = HashMap::with_capacity(extraction.locations.len());
        for location in extraction.locations {
            let file = VirtualFile::new(location);
            indexer.add(file.index_record());
            files.insert(file.path.clone(), file);
        }
        let tree = DirectoryTree::build(
            files.keys().map(String::as_str),
            listing.directories().map(|d| d.path.as_str()),
        );

        let namespace = snapshot.repo.to_string();
        let generation = format!(
            "{}@{}",
            namespace,
            snapshot.metadata.fetched_at.timestamp_millis()
        );
        info!(
            repo = %namespace,
            files = files.len(),
            directories = tree.len(),
            checksum_mismatches = extraction.report.checksum_mismatches,
            "virtual file system built"
        );

        Self {
            namespace,
            generation,
            snapshot: Some(snapshot),
            files,
            tree,
            indexer,
            cache,
            report: extraction.report,
            extractions: AtomicU64::new(0),
        }
    }

    /// A usable VFS with no files, used when no snapshot could be loaded.
    pub fn empty(namespace: impl Into<String>, cache: Arc<ContentCache>) -> Self {
        let namespace = namespace.into();
        Self {
            generation: format!("{namespace}@empty"),
            namespace,
            snapshot: None,
            files: HashMap::new(),
            tree: DirectoryTree::default(),
            indexer: FileIndexer::new(),
            cache,
            report: ExtractionReport::default(),
            extractions: AtomicU64::new(0),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn snapshot(&self) -> Option<&Arc<RepositorySnapshot>> {
        self.snapshot.as_ref()
    }

    pub fn extraction_report(&self) -> &ExtractionReport {
        &self.report
    }

    pub fn indexer(&self) -> &FileIndexer {
        &self.indexer
    }

    pub fn directory_tree(&self) -> &DirectoryTree {
        &self.tree
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Look up a file: exact path first, then suffix/basename resolution.
    pub fn get_file(&self, file_path: &str) -> Option<&VirtualFile> {
        let normalized = path::normalize(file_path);
        if let Some(file) = self.files.get(&normalized) {
            return Some(file);
        }
        let resolved = self.indexer.resolve(&normalized)?;
        debug!(requested = %file_path, resolved = %resolved, "fuzzy path match");
        self.files.get(&resolved)
    }

    /// File body, loaded lazily through the content cache.
    pub fn get_content(&self, file_path: &str) -> Option<Arc<str>> {
        let file = self.get_file(file_path)?;
        let key = self.cache_key(&file.path);
        if let Some(hit) = self.cache.get(&key) {
            debug!(path = %file.path, "content cache hit");
            return Some(hit);
        }

        debug!(path = %file.path, "content cache miss, extracting");
        let body: Arc<str> = Arc::from(self.slice(file)?);
        self.extractions.fetch_add(1, Ordering::Relaxed);
        file.mark_loaded();
        self.cache.put(key, body.clone());
        Some(body)
    }

    /// Lines `start_line..=end_line` (1-based, clamped) of a file.
    pub fn read_range(&self, file_path: &str, start_line: usize, end_line: usize) -> Option<String> {
        let content = self.get_content(file_path)?;
        let start = start_line.max(1);
        if end_line < start {
            return Some(String::new());
        }
        let lines: Vec<&str> = content
            .lines()
            .skip(start - 1)
            .take((end_line - start).saturating_add(1))
            .collect();
        Some(lines.join("\n"))
    }

    /// Names of a directory's children, sorted. Unknown paths list nothing.
    pub fn list_directory(&self, dir_path: &str) -> Vec<String> {
        self.tree
            .get(&path::normalize(dir_path))
            .map(|dir| dir.children.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Children of a directory with kinds and sizes.
    pub fn entries(&self, dir_path: &str) -> Vec<DirEntry> {
        let dir_path = path::normalize(dir_path);
        let Some(dir) = self.tree.get(&dir_path) else {
            return Vec::new();
        };
        dir.children
            .iter()
            .map(|(name, kind)| {
                let child = path::join(&dir_path, name);
                let size = match kind {
                    NodeKind::File => self.files.get(&child).map(|f| f.size),
                    NodeKind::Directory => None,
                };
                DirEntry {
                    name: name.clone(),
                    path: child,
                    kind: *kind,
                    size,
                }
            })
            .collect()
    }

    pub fn exists(&self, target: &str) -> bool {
        self.is_directory(target) || self.get_file(target).is_some()
    }

    pub fn is_directory(&self, target: &str) -> bool {
        self.tree.is_directory(&path::normalize(target))
    }

    pub fn is_file(&self, target: &str) -> bool {
        self.get_file(target).is_some()
    }

    /// Binary by extension table, or by NUL bytes in the body.
    pub fn is_binary(&self, file_path: &str) -> bool {
        self.get_file(file_path).is_some_and(|file| {
            file.has_binary_extension() || self.slice(file).is_some_and(language::looks_binary)
        })
    }

    /// Paths whose full path or file name matches `pattern`, sorted.
    pub fn find_by_pattern(&self, pattern: &str) -> VfsResult<Vec<String>> {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| VfsError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?
            .compile_matcher();
        let mut hits: Vec<String> = self
            .files
            .values()
            .filter(|f| matcher.is_match(&f.path) || matcher.is_match(&f.name))
            .map(|f| f.path.clone())
            .collect();
        hits.sort();
        Ok(hits)
    }

    pub fn search(&self, query: &str, filters: &SearchFilters) -> VfsResult<Vec<IndexedFile>> {
        self.indexer.search(query, filters)
    }

    pub fn metadata(&self, target: &str) -> Option<FileMetadata> {
        let normalized = path::normalize(target);
        if self.tree.is_directory(&normalized) {
            return Some(FileMetadata::for_directory(&self.namespace, &normalized));
        }
        let file = self.get_file(&normalized)?;
        Some(FileMetadata::for_file(
            &self.namespace,
            file,
            self.is_binary(&file.path),
        ))
    }

    /// Every file path, sorted.
    pub fn tree(&self) -> Vec<String> {
        self.indexer.paths()
    }

    /// Pre-load up to `limit` of the smallest text files no larger than
    /// `max_file_bytes`. Returns how many were cached.
    pub fn warm_cache(&self, limit: usize, max_file_bytes: u64) -> usize {
        let mut candidates: Vec<&VirtualFile> = self
            .files
            .values()
            .filter(|f| f.size <= max_file_bytes && !f.has_binary_extension())
            .collect();
        candidates.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.path.cmp(&b.path)));

        let prefix = self.cache_key("");
        let keys = candidates.iter().map(|f| self.cache_key(&f.path));
        self.cache.warm(keys, limit, |key| {
            let file = self.files.get(key.strip_prefix(prefix.as_str())?)?;
            let body = self.slice(file)?;
            self.extractions.fetch_add(1, Ordering::Relaxed);
            file.mark_loaded();
            Some(Arc::from(body))
        })
    }

    /// Drop every cached body belonging to this VFS. Returns entries removed.
    pub fn evict_content(&self) -> usize {
        self.files
            .values()
            .filter(|f| f.is_content_loaded())
            .filter(|f| self.cache.remove(&self.cache_key(&f.path)))
            .count()
    }

    pub fn stats(&self) -> VfsStats {
        VfsStats {
            files: self.files.len(),
            directories: self.tree.len(),
            total_bytes: self.indexer.total_bytes(),
            languages: self.indexer.language_histogram(),
            extractions: self.extractions.load(Ordering::Relaxed),
            loaded_files: self.files.values().filter(|f| f.is_content_loaded()).count(),
            extraction: self.report.clone(),
        }
    }

    fn cache_key(&self, file_path: &str) -> String {
        format!("{}:{}", self.generation, file_path)
    }

    fn slice(&self, file: &VirtualFile) -> Option<&str> {
        let snapshot = self.snapshot.as_ref()?;
        file.location.slice(&snapshot.content)
    }
}

impl std::fmt::Debug for VirtualFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFileSystem")
            .field("namespace", &self.namespace)
            .field("files", &self.files.len())
            .field("directories", &self.tree.len())
            .finish()
    }
}
