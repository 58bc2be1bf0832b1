//! Snapshots read from a directory on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use vrepo_sdk::{OriginFetcher, RepoId, RepositorySnapshot, SdkError, SdkResult};
use vrepo_types::SnapshotMetadata;

pub const CONTENT_FILE: &str = "content.txt";
pub const TREE_FILE: &str = "tree.txt";

/// Serves `content.txt` and `tree.txt` from `root`, or from `root/<repo id>`
/// when `root` holds several repositories.
#[derive(Clone, Debug)]
pub struct DirectoryOrigin {
    root: PathBuf,
}

impl DirectoryOrigin {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn snapshot_dir(&self, repo: &RepoId) -> PathBuf {
        if self.root.join(CONTENT_FILE).is_file() {
            self.root.clone()
        } else {
            self.root.join(repo.as_str())
        }
    }
}

#[async_trait]
impl OriginFetcher for DirectoryOrigin {
    async fn fetch(&self, repo: &RepoId) -> SdkResult<RepositorySnapshot> {
        let dir = self.snapshot_dir(repo);
        let read = |name: &'static str| {
            let file = dir.join(name);
            async move {
                tokio::fs::read_to_string(&file).await.map_err(|e| SdkError::Fetch {
                    repo: repo.clone(),
                    reason: format!("{}: {e}", file.display()),
                })
            }
        };
        let content = read(CONTENT_FILE).await?;
        let tree = read(TREE_FILE).await?;
        debug!(repo = %repo, dir = %dir.display(), bytes = content.len(), "snapshot read from disk");

        let metadata = SnapshotMetadata::new(content.len() as u64).with_source(source_url(&dir));
        Ok(RepositorySnapshot::new(repo.clone(), content, tree).with_metadata(metadata))
    }

    async fn estimate_size(&self, repo: &RepoId) -> Option<u64> {
        let file = self.snapshot_dir(repo).join(CONTENT_FILE);
        tokio::fs::metadata(file).await.ok().map(|m| m.len())
    }
}

fn source_url(dir: &Path) -> String {
    format!("file://{}", dir.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_snapshot(dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(CONTENT_FILE), "FILE: a.txt\nhello").unwrap();
        std::fs::write(dir.join(TREE_FILE), "a.txt").unwrap();
    }

    #[tokio::test]
    async fn reads_flat_directory() {
        let tmp = tempfile::tempdir().unwrap();
        write_snapshot(tmp.path());
        let origin = DirectoryOrigin::new(tmp.path());
        let repo = RepoId::new("any/repo").unwrap();

        let snapshot = origin.fetch(&repo).await.unwrap();
        assert_eq!(snapshot.content, "FILE: a.txt\nhello");
        assert_eq!(snapshot.tree, "a.txt");
        assert_eq!(snapshot.metadata.estimated_size, 17);
        assert!(snapshot.metadata.source.unwrap().starts_with("file://"));
        assert_eq!(origin.estimate_size(&repo).await, Some(17));
    }

    #[tokio::test]
    async fn reads_per_repository_directory() {
        let tmp = tempfile::tempdir().unwrap();
        write_snapshot(&tmp.path().join("octo").join("demo"));
        let origin = DirectoryOrigin::new(tmp.path());

        let snapshot = origin.fetch(&RepoId::new("octo/demo").unwrap()).await.unwrap();
        assert_eq!(snapshot.tree, "a.txt");
    }

    #[tokio::test]
    async fn missing_files_are_fetch_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let origin = DirectoryOrigin::new(tmp.path());
        let repo = RepoId::new("octo/none").unwrap();
        let err = origin.fetch(&repo).await.unwrap_err();
        assert!(matches!(err, SdkError::Fetch { .. }));
        assert_eq!(origin.estimate_size(&repo).await, None);
    }
}
