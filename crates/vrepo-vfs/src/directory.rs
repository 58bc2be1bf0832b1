//! Directory tree synthesized from a flat list of file paths.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::path;

/// Kind of a directory child.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Directory,
}

/// One directory node. The root has an empty path and name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VirtualDirectory {
    pub path: String,
    pub name: String,
    /// Children by name, sorted.
    pub children: BTreeMap<String, NodeKind>,
    /// Number of direct child files.
    pub file_count: usize,
    /// Number of direct child directories.
    pub dir_count: usize,
}

impl VirtualDirectory {
    fn new(dir_path: &str) -> Self {
        Self {
            path: dir_path.to_string(),
            name: path::file_name(dir_path).to_string(),
            children: BTreeMap::new(),
            file_count: 0,
            dir_count: 0,
        }
    }

    fn recount(&mut self) {
        self.file_count = self
            .children
            .values()
            .filter(|k| **k == NodeKind::File)
            .count();
        self.dir_count = self.children.len() - self.file_count;
    }
}

/// Every directory implied by a snapshot, keyed by path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryTree {
    dirs: BTreeMap<String, VirtualDirectory>,
}

impl DirectoryTree {
    /// Build the tree from file paths plus directories that may have no
    /// files (e.g. listed but empty). Intermediate directories are created
    /// as needed.
    pub fn build<'a, F, D>(files: F, extra_dirs: D) -> Self
    where
        F: IntoIterator<Item = &'a str>,
        D: IntoIterator<Item = &'a str>,
    {
        let mut tree = Self {
            dirs: BTreeMap::new(),
        };
        tree.dirs.insert(String::new(), VirtualDirectory::new(""));

        for file in files {
            tree.link(file, NodeKind::File);
        }
        for dir in extra_dirs {
            let dir = path::normalize(dir);
            if !dir.is_empty() && !tree.dirs.contains_key(&dir) {
                tree.ensure_dir(&dir);
            }
        }
        for dir in tree.dirs.values_mut() {
            dir.recount();
        }
        tree
    }

    fn link(&mut self, child: &str, kind: NodeKind) {
        let parent = path::parent(child).to_string();
        if !self.dirs.contains_key(&parent) {
            self.ensure_dir(&parent);
        }
        if let Some(dir) = self.dirs.get_mut(&parent) {
            dir.children
                .insert(path::file_name(child).to_string(), kind);
        }
    }

    fn ensure_dir(&mut self, dir_path: &str) {
        if dir_path.is_empty() || self.dirs.contains_key(dir_path) {
            return;
        }
        self.dirs
            .insert(dir_path.to_string(), VirtualDirectory::new(dir_path));
        self.link(dir_path, NodeKind::Directory);
    }

    pub fn get(&self, dir_path: &str) -> Option<&VirtualDirectory> {
        self.dirs.get(dir_path)
    }

    pub fn is_directory(&self, dir_path: &str) -> bool {
        self.dirs.contains_key(dir_path)
    }

    /// Every directory path except the root, sorted.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.dirs.keys().filter(|k| !k.is_empty()).map(String::as_str)
    }

    pub fn root(&self) -> &VirtualDirectory {
        &self.dirs[""]
    }

    /// Number of directories, excluding the root.
    pub fn len(&self) -> usize {
        self.dirs.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DirectoryTree {
    fn default() -> Self {
        Self::build(std::iter::empty(), std::iter::empty())
    }
}
