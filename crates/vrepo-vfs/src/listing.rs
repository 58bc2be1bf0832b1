//! Tree listing parser.
//!
//! A snapshot's tree listing comes in one of two shapes:
//!
//! ```text
//! Directory structure:          src/
//! └── repo/                     src/main.py blake3:9f2c...
//!     ├── src/                  README.md
//!     │   └── main.py
//!     └── README.md
//! ```
//!
//! Both are accepted. Directory lines end with `/`; a file line may carry a
//! trailing `blake3:<hex>` checksum token. In box-drawn listings a single
//! enclosing root directory is stripped so paths are relative to the
//! repository root.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;
use vrepo_types::Digest;

use crate::path;

const HEADER_LINE: &str = "Directory structure:";
const CHECKSUM_PREFIX: &str = "blake3:";
const CONNECTORS: [&str; 4] = ["├── ", "└── ", "|-- ", "`-- "];

/// One line of a parsed tree listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    pub path: String,
    pub is_dir: bool,
    pub checksum: Option<Digest>,
}

/// A parsed tree listing with path lookup.
#[derive(Clone, Debug, Default)]
pub struct TreeListing {
    entries: Vec<ListingEntry>,
    by_path: HashMap<String, usize>,
    root: Option<String>,
}

impl TreeListing {
    /// Parse a raw listing. Unrecognized lines are skipped, never rejected.
    pub fn parse(raw: &str) -> Self {
        let mut entries = Vec::new();
        let mut stack: Vec<String> = Vec::new();
        let mut boxed = false;

        for line in raw.lines() {
            let trimmed = line.trim_end();
            if trimmed.trim().is_empty() || trimmed.trim() == HEADER_LINE {
                continue;
            }
            let (depth, body) = match split_connector(trimmed) {
                Some((depth, body)) => (Some(depth), body),
                None => (None, trimmed.trim()),
            };
            if body.chars().all(|c| matches!(c, '│' | '|' | ' ')) {
                continue;
            }

            let (name, checksum) = split_checksum(body);
            let is_dir = name.ends_with('/');
            let name = name.trim_end_matches('/');
            if name.is_empty() {
                continue;
            }

            let full = match depth {
                Some(depth) => {
                    boxed = true;
                    stack.truncate(depth);
                    let joined = if stack.is_empty() {
                        name.to_string()
                    } else {
                        format!("{}/{}", stack.join("/"), name)
                    };
                    if is_dir {
                        stack.push(name.to_string());
                    }
                    joined
                }
                None => name.to_string(),
            };

            let normalized = path::normalize(&full);
            if normalized.is_empty() {
                continue;
            }
            entries.push(ListingEntry {
                path: normalized,
                is_dir,
                checksum,
            });
        }

        let root = if boxed { single_root(&entries) } else { None };
        if let Some(root) = &root {
            let prefix = format!("{root}/");
            entries.retain(|e| e.path != *root);
            for entry in &mut entries {
                if let Some(rest) = entry.path.strip_prefix(&prefix) {
                    entry.path = rest.to_string();
                }
            }
            debug!(root = %root, "stripped enclosing root directory from listing");
        }

        let by_path = entries
            .iter()
            .enumerate()
            .map(|(idx, e)| (e.path.clone(), idx))
            .collect();
        Self {
            entries,
            by_path,
            root,
        }
    }

    pub fn entries(&self) -> &[ListingEntry] {
        &self.entries
    }

    /// File entries only.
    pub fn files(&self) -> impl Iterator<Item = &ListingEntry> {
        self.entries.iter().filter(|e| !e.is_dir)
    }

    /// Directory entries only.
    pub fn directories(&self) -> impl Iterator<Item = &ListingEntry> {
        self.entries.iter().filter(|e| e.is_dir)
    }

    /// Name of the stripped enclosing root directory, if there was one.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn get(&self, path: &str) -> Option<&ListingEntry> {
        self.by_path.get(path).map(|&idx| &self.entries[idx])
    }

    /// Checksum recorded for a file, if the listing carried one.
    pub fn checksum_for(&self, path: &str) -> Option<&Digest> {
        self.get(path).and_then(|e| e.checksum.as_ref())
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.get(path).is_some_and(|e| !e.is_dir)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Locate a box-drawing connector and return `(depth, remainder)`.
fn split_connector(line: &str) -> Option<(usize, &str)> {
    CONNECTORS.iter().find_map(|connector| {
        let idx = line.find(connector)?;
        let depth = line[..idx].chars().count() / 4;
        Some((depth, line[idx + connector.len()..].trim()))
    })
}

fn split_checksum(body: &str) -> (&str, Option<Digest>) {
    if let Some((name, token)) = body.rsplit_once(char::is_whitespace) {
        if let Some(hex) = token.strip_prefix(CHECKSUM_PREFIX) {
            return (name.trim_end(), Digest::from_hex(hex).ok());
        }
    }
    (body, None)
}

/// The enclosing directory, if the listing has exactly one top-level entry
/// and it is a directory.
fn single_root(entries: &[ListingEntry]) -> Option<String> {
    let mut top = entries.iter().filter(|e| !e.path.contains('/'));
    let first = top.next()?;
    if top.next().is_some() || !first.is_dir {
        return None;
    }
    let prefix = format!("{}/", first.path);
    entries
        .iter()
        .all(|e| e.path == first.path || e.path.starts_with(&prefix))
        .then(|| first.path.clone())
}
