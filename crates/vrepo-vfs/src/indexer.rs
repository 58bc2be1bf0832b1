//! Lookup indices over the files of one snapshot.
//!
//! Every indexed path occupies exactly one slot in each index kind: path,
//! name, extension (`""` when there is none), language (`"unknown"` when the
//! table has no entry), size bucket and parent directory. `add` and `remove`
//! update all kinds under one write lock, and empty slots are dropped so a
//! removed path leaves nothing behind.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use globset::{GlobBuilder, GlobMatcher};
use serde::Serialize;
use tracing::debug;

use crate::error::{VfsError, VfsResult};
use crate::language::{self, SizeBucket};
use crate::path;

/// Index record for one file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IndexedFile {
    pub path: String,
    pub name: String,
    pub extension: Option<String>,
    pub language: &'static str,
    pub size: u64,
    pub bucket: SizeBucket,
    pub directory: String,
}

impl IndexedFile {
    /// Derive every index key from a normalized path and a size.
    pub fn new(file_path: &str, size: u64) -> Self {
        let name = path::file_name(file_path).to_string();
        let extension = path::extension(&name);
        let language = language::language_for(&name, extension.as_deref());
        Self {
            path: file_path.to_string(),
            directory: path::parent(file_path).to_string(),
            bucket: SizeBucket::for_size(size),
            name,
            extension,
            language,
            size,
        }
    }

    fn extension_slot(&self) -> &str {
        self.extension.as_deref().unwrap_or("")
    }
}

/// Optional filters for [`FileIndexer::search`]. Unset filters match all.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchFilters {
    pub extension: Option<String>,
    pub language: Option<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub directory_prefix: Option<String>,
    pub limit: Option<usize>,
}

impl SearchFilters {
    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        let ext = ext.into();
        self.extension = Some(ext.trim_start_matches('.').to_ascii_lowercase());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into().to_ascii_lowercase());
        self
    }

    pub fn min_size(mut self, bytes: u64) -> Self {
        self.min_size = Some(bytes);
        self
    }

    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    pub fn directory(mut self, prefix: impl AsRef<str>) -> Self {
        self.directory_prefix = Some(path::normalize(prefix.as_ref()));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn accepts(&self, file: &IndexedFile) -> bool {
        if let Some(ext) = &self.extension {
            if file.extension_slot() != ext {
                return false;
            }
        }
        if let Some(lang) = &self.language {
            if file.language != lang {
                return false;
            }
        }
        if self.min_size.is_some_and(|min| file.size < min) {
            return false;
        }
        if self.max_size.is_some_and(|max| file.size > max) {
            return false;
        }
        if let Some(prefix) = &self.directory_prefix {
            if !prefix.is_empty()
                && file.directory != *prefix
                && !file.directory.starts_with(&format!("{prefix}/"))
            {
                return false;
            }
        }
        true
    }
}

type Slots<K> = HashMap<K, BTreeSet<String>>;

#[derive(Default)]
struct Indices {
    by_path: BTreeMap<String, IndexedFile>,
    by_name: Slots<String>,
    by_extension: Slots<String>,
    by_language: Slots<&'static str>,
    by_size: Slots<SizeBucket>,
    by_directory: Slots<String>,
}

fn insert_slot<K: std::hash::Hash + Eq>(slots: &mut Slots<K>, key: K, path: &str) {
    slots.entry(key).or_default().insert(path.to_string());
}

fn remove_slot<K: std::hash::Hash + Eq>(slots: &mut Slots<K>, key: &K, path: &str) {
    if let Some(set) = slots.get_mut(key) {
        set.remove(path);
        if set.is_empty() {
            slots.remove(key);
        }
    }
}

fn slot_paths<K: std::hash::Hash + Eq>(slots: &Slots<K>, key: &K) -> Vec<String> {
    slots
        .get(key)
        .map(|set| set.iter().cloned().collect())
        .unwrap_or_default()
}

impl Indices {
    fn insert(&mut self, file: IndexedFile) {
        if let Some(old) = self.by_path.remove(&file.path) {
            self.unlink(&old);
        }
        insert_slot(&mut self.by_name, file.name.clone(), &file.path);
        insert_slot(&mut self.by_extension, file.extension_slot().to_string(), &file.path);
        insert_slot(&mut self.by_language, file.language, &file.path);
        insert_slot(&mut self.by_size, file.bucket, &file.path);
        insert_slot(&mut self.by_directory, file.directory.clone(), &file.path);
        self.by_path.insert(file.path.clone(), file);
    }

    fn delete(&mut self, file_path: &str) -> Option<IndexedFile> {
        let old = self.by_path.remove(file_path)?;
        self.unlink(&old);
        Some(old)
    }

    fn unlink(&mut self, file: &IndexedFile) {
        remove_slot(&mut self.by_name, &file.name, &file.path);
        remove_slot(&mut self.by_extension, &file.extension_slot().to_string(), &file.path);
        remove_slot(&mut self.by_language, &file.language, &file.path);
        remove_slot(&mut self.by_size, &file.bucket, &file.path);
        remove_slot(&mut self.by_directory, &file.directory, &file.path);
    }
}

/// Thread-safe multi-key file index.
pub struct FileIndexer {
    inner: RwLock<Indices>,
}

impl FileIndexer {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Indices::default()),
        }
    }

    /// Index a file, replacing any previous record at the same path.
    pub fn add(&self, file: IndexedFile) {
        debug!(path = %file.path, language = file.language, "indexing file");
        self.inner.write().expect("index lock poisoned").insert(file);
    }

    /// Remove a file from every index. Returns the removed record.
    pub fn remove(&self, file_path: &str) -> Option<IndexedFile> {
        let removed = self
            .inner
            .write()
            .expect("index lock poisoned")
            .delete(file_path);
        if removed.is_some() {
            debug!(path = %file_path, "file removed from index");
        }
        removed
    }

    pub fn exists(&self, file_path: &str) -> bool {
        self.read().by_path.contains_key(file_path)
    }

    pub fn by_path(&self, file_path: &str) -> Option<IndexedFile> {
        self.read().by_path.get(file_path).cloned()
    }

    pub fn by_name(&self, name: &str) -> Vec<String> {
        slot_paths(&self.read().by_name, &name.to_string())
    }

    /// Paths with the given extension; `""` selects files without one.
    pub fn by_extension(&self, ext: &str) -> Vec<String> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        slot_paths(&self.read().by_extension, &ext)
    }

    pub fn by_language(&self, lang: &str) -> Vec<String> {
        let guard = self.read();
        guard
            .by_language
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(lang))
            .map(|(_, set)| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn by_size_bucket(&self, bucket: SizeBucket) -> Vec<String> {
        slot_paths(&self.read().by_size, &bucket)
    }

    /// Files whose parent directory is exactly `dir`.
    pub fn by_directory(&self, dir: &str) -> Vec<String> {
        slot_paths(&self.read().by_directory, &path::normalize(dir))
    }

    /// Every indexed path, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.read().by_path.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().by_path.is_empty()
    }

    /// File count per language.
    pub fn language_histogram(&self) -> BTreeMap<String, usize> {
        self.read()
            .by_language
            .iter()
            .map(|(lang, set)| (lang.to_string(), set.len()))
            .collect()
    }

    /// Sum of indexed file sizes.
    pub fn total_bytes(&self) -> u64 {
        self.read().by_path.values().map(|f| f.size).sum()
    }

    /// Glob-match file names (or full paths when the query contains `/`)
    /// and intersect with `filters`. A query without glob metacharacters is
    /// a case-insensitive substring match; an empty query matches all.
    pub fn search(&self, query: &str, filters: &SearchFilters) -> VfsResult<Vec<IndexedFile>> {
        let matcher = compile_query(query)?;
        let match_path = query.contains('/');
        let limit = filters.limit.unwrap_or(usize::MAX);

        let guard = self.read();
        let candidates: Box<dyn Iterator<Item = &IndexedFile>> = match &filters.extension {
            Some(ext) => Box::new(
                guard
                    .by_extension
                    .get(ext)
                    .into_iter()
                    .flatten()
                    .filter_map(|p| guard.by_path.get(p)),
            ),
            None => Box::new(guard.by_path.values()),
        };

        Ok(candidates
            .filter(|file| filters.accepts(file))
            .filter(|file| match &matcher {
                Some(m) if match_path => m.is_match(&file.path),
                Some(m) => m.is_match(&file.name),
                None => true,
            })
            .take(limit)
            .cloned()
            .collect())
    }

    /// Resolve a path that is not indexed verbatim.
    ///
    /// Tries, in order: a unique indexed path ending in `/{query}`, an indexed
    /// path that `query` itself ends with (query carries an extra root), and
    /// a unique file name match. Ambiguous matches resolve to nothing.
    pub fn resolve(&self, query: &str) -> Option<String> {
        let query = path::normalize(query);
        if query.is_empty() {
            return None;
        }
        let guard = self.read();
        if guard.by_path.contains_key(&query) {
            return Some(query);
        }

        let suffix = format!("/{query}");
        let mut hits = guard.by_path.keys().filter(|p| p.ends_with(&suffix));
        if let (Some(hit), None) = (hits.next(), hits.next()) {
            return Some(hit.clone());
        }

        let mut trimmed = query.as_str();
        while let Some(idx) = trimmed.find('/') {
            trimmed = &trimmed[idx + 1..];
            if guard.by_path.contains_key(trimmed) {
                return Some(trimmed.to_string());
            }
        }

        let name = path::file_name(&query);
        match guard.by_name.get(name) {
            Some(set) if set.len() == 1 => set.iter().next().cloned(),
            _ => None,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Indices> {
        self.inner.read().expect("index lock poisoned")
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        let guard = self.read();
        let n = guard.by_path.len();
        let total = |counts: Vec<usize>| counts.into_iter().sum::<usize>();
        assert_eq!(total(guard.by_name.values().map(BTreeSet::len).collect()), n);
        assert_eq!(total(guard.by_extension.values().map(BTreeSet::len).collect()), n);
        assert_eq!(total(guard.by_language.values().map(BTreeSet::len).collect()), n);
        assert_eq!(total(guard.by_size.values().map(BTreeSet::len).collect()), n);
        assert_eq!(total(guard.by_directory.values().map(BTreeSet::len).collect()), n);
        for file in guard.by_path.values() {
            assert!(guard.by_name[&file.name].contains(&file.path));
            assert!(guard.by_extension[file.extension_slot()].contains(&file.path));
            assert!(guard.by_language[&file.language].contains(&file.path));
            assert!(guard.by_size[&file.bucket].contains(&file.path));
            assert!(guard.by_directory[&file.directory].contains(&file.path));
        }
    }
}

impl Default for FileIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FileIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileIndexer")
            .field("files", &self.len())
            .finish()
    }
}

fn compile_query(query: &str) -> VfsResult<Option<GlobMatcher>> {
    let query = query.trim();
    if query.is_empty() || query == "*" {
        return Ok(None);
    }
    let pattern = if query.contains(['*', '?', '[', '{']) {
        query.to_string()
    } else {
        format!("*{query}*")
    };
    let glob = GlobBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| VfsError::InvalidPattern {
            pattern: query.to_string(),
            reason: e.to_string(),
        })?;
    Ok(Some(glob.compile_matcher()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn indexer_with(files: &[(&str, u64)]) -> FileIndexer {
        let idx = FileIndexer::new();
        for (p, size) in files {
            idx.add(IndexedFile::new(p, *size));
        }
        idx
    }

    fn sample() -> FileIndexer {
        indexer_with(&[
            ("src/main.py", 120),
            ("src/util/io.py", 4_000),
            ("src/lib.rs", 50_000),
            ("docs/guide.md", 2_000_000),
            ("Makefile", 300),
            ("README.md", 900),
        ])
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    #[test]
    fn record_fields_are_derived() {
        let f = IndexedFile::new("src/util/io.py", 4_000);
        assert_eq!(f.name, "io.py");
        assert_eq!(f.extension.as_deref(), Some("py"));
        assert_eq!(f.language, "python");
        assert_eq!(f.bucket, SizeBucket::Small);
        assert_eq!(f.directory, "src/util");
    }

    #[test]
    fn lookups_by_each_kind() {
        let idx = sample();
        assert_eq!(idx.by_path("src/lib.rs").unwrap().language, "rust");
        assert_eq!(idx.by_name("io.py"), vec!["src/util/io.py"]);
        assert_eq!(idx.by_extension(".PY"), vec!["src/main.py", "src/util/io.py"]);
        assert_eq!(idx.by_extension(""), vec!["Makefile"]);
        assert_eq!(idx.by_language("Markdown"), vec!["README.md", "docs/guide.md"]);
        assert_eq!(idx.by_size_bucket(SizeBucket::Huge), vec!["docs/guide.md"]);
        assert_eq!(idx.by_directory("src"), vec!["src/lib.rs", "src/main.py"]);
        assert_eq!(idx.by_directory(""), vec!["Makefile", "README.md"]);
    }

    #[test]
    fn remove_clears_every_slot() {
        let idx = sample();
        let removed = idx.remove("src/util/io.py").unwrap();
        assert_eq!(removed.name, "io.py");
        assert!(!idx.exists("src/util/io.py"));
        assert!(idx.by_name("io.py").is_empty());
        assert!(idx.by_directory("src/util").is_empty());
        assert!(idx.by_size_bucket(SizeBucket::Small).is_empty());
        assert_eq!(idx.by_extension("py"), vec!["src/main.py"]);
        assert!(idx.remove("src/util/io.py").is_none());
        idx.assert_consistent();
    }

    #[test]
    fn re_adding_replaces_previous_slots() {
        let idx = indexer_with(&[("a.txt", 10)]);
        idx.add(IndexedFile::new("a.txt", 5_000));
        assert!(idx.by_size_bucket(SizeBucket::Tiny).is_empty());
        assert_eq!(idx.by_size_bucket(SizeBucket::Small), vec!["a.txt"]);
        assert_eq!(idx.len(), 1);
        idx.assert_consistent();
    }

    #[test]
    fn histogram_and_totals() {
        let idx = sample();
        let hist = idx.language_histogram();
        assert_eq!(hist["python"], 2);
        assert_eq!(hist["makefile"], 1);
        assert_eq!(idx.total_bytes(), 120 + 4_000 + 50_000 + 2_000_000 + 300 + 900);
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    #[test]
    fn glob_search_on_names() {
        let idx = sample();
        let hits = idx.search("*.PY", &SearchFilters::default()).unwrap();
        let paths: Vec<&str> = hits.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/main.py", "src/util/io.py"]);
    }

    #[test]
    fn plain_query_is_substring() {
        let idx = sample();
        let hits = idx.search("read", &SearchFilters::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "README.md");
    }

    #[test]
    fn path_query_matches_full_path() {
        let idx = sample();
        let hits = idx.search("src/**/*.py", &SearchFilters::default()).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn filters_intersect() {
        let idx = sample();
        let filters = SearchFilters::default()
            .language("python")
            .min_size(1_000)
            .directory("src");
        let hits = idx.search("", &filters).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "src/util/io.py");

        let filters = SearchFilters::default().extension("md").max_size(1_000);
        let hits = idx.search("*", &filters).unwrap();
        assert_eq!(hits[0].path, "README.md");
        assert_eq!(hits.len(), 1);

        let limited = idx.search("", &SearchFilters::default().limit(2)).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn directory_prefix_is_segment_aware() {
        let idx = indexer_with(&[("src/a.rs", 1), ("srcx/b.rs", 1)]);
        let hits = idx.search("", &SearchFilters::default().directory("src")).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn invalid_glob_is_reported() {
        let idx = sample();
        let err = idx.search("[abc", &SearchFilters::default()).unwrap_err();
        assert!(matches!(err, VfsError::InvalidPattern { .. }));
    }

    // -----------------------------------------------------------------------
    // Fuzzy resolution
    // -----------------------------------------------------------------------

    #[test]
    fn resolve_variants() {
        let idx = sample();
        assert_eq!(idx.resolve("./src/lib.rs").as_deref(), Some("src/lib.rs"));
        assert_eq!(idx.resolve("util/io.py").as_deref(), Some("src/util/io.py"));
        assert_eq!(idx.resolve("repo/src/main.py").as_deref(), Some("src/main.py"));
        assert_eq!(idx.resolve("lib.rs").as_deref(), Some("src/lib.rs"));
        assert_eq!(idx.resolve("nothing.txt"), None);
    }

    #[test]
    fn ambiguous_basename_resolves_to_none() {
        let idx = indexer_with(&[("a/mod.rs", 1), ("b/mod.rs", 1)]);
        assert_eq!(idx.resolve("mod.rs"), None);
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    fn arb_path() -> impl Strategy<Value = String> {
        (
            prop::sample::select(vec!["", "src", "src/util", "docs"]),
            prop::sample::select(vec!["a", "b", "Makefile", "c"]),
            prop::sample::select(vec![".py", ".rs", ".md", ""]),
        )
            .prop_map(|(dir, stem, ext)| path::join(dir, &format!("{stem}{ext}")))
    }

    proptest! {
        #[test]
        fn add_remove_keeps_indices_consistent(
            ops in prop::collection::vec((any::<bool>(), arb_path(), 0u64..3_000_000), 1..60)
        ) {
            let idx = FileIndexer::new();
            let mut expected = std::collections::BTreeSet::new();
            for (add, p, size) in ops {
                if add {
                    idx.add(IndexedFile::new(&p, size));
                    expected.insert(p.clone());
                    prop_assert!(idx.exists(&p));
                    prop_assert_eq!(idx.by_path(&p).map(|f| f.size), Some(size));
                } else {
                    idx.remove(&p);
                    expected.remove(&p);
                    prop_assert!(!idx.exists(&p));
                    let name = path::file_name(&p).to_string();
                    prop_assert!(!idx.by_name(&name).contains(&p));
                    prop_assert!(!idx.by_directory(path::parent(&p)).contains(&p));
                }
                idx.assert_consistent();
            }
            prop_assert_eq!(idx.paths(), expected.into_iter().collect::<Vec<_>>());
        }
    }
}
