//! Structural validation of repository snapshots.

use std::fmt;

use vrepo_types::{RepositorySnapshot, FILE_HEADER_PREFIX};

/// Why a snapshot failed structural validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SnapshotDefect {
    /// The content blob is empty or whitespace-only.
    EmptyContent,
    /// The content blob has no file section headers.
    MissingFileMarkers,
    /// The tree listing is empty or whitespace-only.
    EmptyTree,
}

impl fmt::Display for SnapshotDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotDefect::EmptyContent => f.write_str("content blob is empty"),
            SnapshotDefect::MissingFileMarkers => {
                write!(f, "content blob has no `{FILE_HEADER_PREFIX}` section markers")
            }
            SnapshotDefect::EmptyTree => f.write_str("tree listing is empty"),
        }
    }
}

/// Check a snapshot's structural integrity.
///
/// This is deliberately shallow: it detects truncated or garbled cache
/// entries, not semantic problems inside individual files.
pub fn validate_snapshot(snapshot: &RepositorySnapshot) -> Result<(), SnapshotDefect> {
    if snapshot.content.trim().is_empty() {
        return Err(SnapshotDefect::EmptyContent);
    }
    let has_marker = snapshot
        .content
        .lines()
        .any(|line| line.trim_start().starts_with(FILE_HEADER_PREFIX));
    if !has_marker {
        return Err(SnapshotDefect::MissingFileMarkers);
    }
    if snapshot.tree.trim().is_empty() {
        return Err(SnapshotDefect::EmptyTree);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrepo_types::RepoId;

    fn snap(content: &str, tree: &str) -> RepositorySnapshot {
        RepositorySnapshot::new(RepoId::new("a/b").unwrap(), content, tree)
    }

    #[test]
    fn valid_snapshot_passes() {
        assert_eq!(validate_snapshot(&snap("FILE: a.py\nprint(1)", "a.py")), Ok(()));
    }

    #[test]
    fn whitespace_content_is_empty() {
        assert_eq!(
            validate_snapshot(&snap("  \n\t", "a.py")),
            Err(SnapshotDefect::EmptyContent)
        );
    }

    #[test]
    fn content_without_markers() {
        assert_eq!(
            validate_snapshot(&snap("just some text", "a.py")),
            Err(SnapshotDefect::MissingFileMarkers)
        );
    }

    #[test]
    fn empty_tree() {
        assert_eq!(
            validate_snapshot(&snap("FILE: a.py\nx", "\n")),
            Err(SnapshotDefect::EmptyTree)
        );
    }
}
