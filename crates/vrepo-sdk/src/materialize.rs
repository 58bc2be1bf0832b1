//! On-demand copies of virtual files on the real file system.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};
use vrepo_vfs::path;

enum Scratch {
    Temp(TempDir),
    Fixed(PathBuf),
}

impl Scratch {
    fn path(&self) -> &Path {
        match self {
            Scratch::Temp(dir) => dir.path(),
            Scratch::Fixed(dir) => dir,
        }
    }
}

/// Writes individual files into a per-repository scratch directory when a
/// consumer needs a real path. Nothing is written until asked for.
///
/// The scratch directory is created lazily: under the configured root when
/// there is one, otherwise as a temporary directory.
pub struct Materializer {
    root: Option<PathBuf>,
    prefix: String,
    scratch: Option<Scratch>,
    files: BTreeSet<String>,
}

impl Materializer {
    /// `prefix` names the scratch directory (a repository slug).
    pub fn new(prefix: impl Into<String>, root: Option<PathBuf>) -> Self {
        Self {
            root,
            prefix: prefix.into(),
            scratch: None,
            files: BTreeSet::new(),
        }
    }

    /// Scratch directory, once something has been materialized.
    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch.as_ref().map(Scratch::path)
    }

    pub fn is_materialized(&self, file_path: &str) -> bool {
        self.files.contains(&path::normalize(file_path))
    }

    /// Materialized paths relative to the scratch directory.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }

    /// Write `content` at `file_path` under the scratch directory and return
    /// the absolute path. `..` segments are clamped at the scratch root.
    /// I/O failures are logged and yield `None`.
    pub fn write(&mut self, file_path: &str, content: &str) -> Option<PathBuf> {
        let relative = path::normalize(file_path);
        if relative.is_empty() {
            warn!(path = %file_path, "refusing to materialize an empty path");
            return None;
        }

        let base = match self.ensure_scratch() {
            Ok(base) => base,
            Err(e) => {
                warn!(error = %e, "scratch directory unavailable");
                return None;
            }
        };
        let target = base.join(&relative);
        let written = target
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| fs::write(&target, content));
        match written {
            Ok(()) => {
                debug!(path = %relative, bytes = content.len(), "file materialized");
                self.files.insert(relative);
                Some(target)
            }
            Err(e) => {
                warn!(path = %relative, error = %e, "materialization failed");
                None
            }
        }
    }

    /// Remove a single materialized file. Best-effort.
    pub fn discard(&mut self, file_path: &str) -> bool {
        let relative = path::normalize(file_path);
        if !self.files.remove(&relative) {
            return false;
        }
        if let Some(base) = self.scratch_dir() {
            if let Err(e) = fs::remove_file(base.join(&relative)) {
                warn!(path = %relative, error = %e, "failed to remove materialized file");
            }
        }
        true
    }

    /// Remove the scratch directory and everything in it. Failures are
    /// logged. Returns the number of files that had been materialized; a
    /// second call returns 0.
    pub fn cleanup(&mut self) -> usize {
        let count = self.files.len();
        self.files.clear();
        let Some(scratch) = self.scratch.take() else {
            return count;
        };
        let result = match scratch {
            Scratch::Temp(dir) => {
                let shown = dir.path().display().to_string();
                dir.close().map(|()| shown)
            }
            Scratch::Fixed(dir) => {
                fs::remove_dir_all(&dir).map(|()| dir.display().to_string())
            }
        };
        match result {
            Ok(dir) => debug!(dir = %dir, files = count, "scratch directory removed"),
            Err(e) => warn!(error = %e, "scratch directory cleanup failed"),
        }
        count
    }

    fn ensure_scratch(&mut self) -> std::io::Result<PathBuf> {
        if let Some(scratch) = &self.scratch {
            return Ok(scratch.path().to_path_buf());
        }
        let prefix = format!("vrepo-{}-", self.prefix);
        let scratch = match &self.root {
            Some(root) => {
                fs::create_dir_all(root)?;
                let dir = root.join(format!("{prefix}{}", uuid::Uuid::now_v7().simple()));
                fs::create_dir_all(&dir)?;
                Scratch::Fixed(dir)
            }
            None => Scratch::Temp(tempfile::Builder::new().prefix(&prefix).tempdir()?),
        };
        let dir = scratch.path().to_path_buf();
        self.scratch = Some(scratch);
        Ok(dir)
    }
}

impl Drop for Materializer {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl std::fmt::Debug for Materializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Materializer")
            .field("scratch", &self.scratch_dir())
            .field("files", &self.files.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_created_until_first_write() {
        let m = Materializer::new("o_r", None);
        assert!(m.scratch_dir().is_none());
    }

    #[test]
    fn writes_nested_files() {
        let mut m = Materializer::new("o_r", None);
        let target = m.write("src/pkg/a.py", "print(1)").unwrap();
        assert!(target.starts_with(m.scratch_dir().unwrap()));
        assert_eq!(fs::read_to_string(&target).unwrap(), "print(1)");
        assert!(m.is_materialized("./src/pkg/a.py"));
        assert_eq!(m.files().collect::<Vec<_>>(), vec!["src/pkg/a.py"]);
    }

    #[test]
    fn parent_segments_stay_inside_scratch() {
        let mut m = Materializer::new("o_r", None);
        assert!(m.write("", "x").is_none());
        assert!(m.scratch_dir().is_none());
        let target = m.write("../../etc/passwd", "x").unwrap();
        assert!(target.starts_with(m.scratch_dir().unwrap()));
        assert!(m.is_materialized("etc/passwd"));
    }

    #[test]
    fn cleanup_is_idempotent() {
        let mut m = Materializer::new("o_r", None);
        m.write("a.txt", "a").unwrap();
        m.write("b/c.txt", "c").unwrap();
        let dir = m.scratch_dir().unwrap().to_path_buf();

        assert_eq!(m.cleanup(), 2);
        assert!(!dir.exists());
        assert_eq!(m.cleanup(), 0);
        assert!(m.scratch_dir().is_none());
    }

    #[test]
    fn configured_root_is_used_and_removed() {
        let root = tempfile::tempdir().unwrap();
        let mut m = Materializer::new("o_r", Some(root.path().to_path_buf()));
        let target = m.write("x.rs", "fn main() {}").unwrap();
        let dir = m.scratch_dir().unwrap().to_path_buf();
        assert!(dir.starts_with(root.path()));
        assert!(target.exists());

        m.cleanup();
        assert!(!dir.exists());
        assert!(root.path().exists());
    }

    #[test]
    fn discard_removes_one_file() {
        let mut m = Materializer::new("o_r", None);
        let a = m.write("a.txt", "a").unwrap();
        let b = m.write("b.txt", "b").unwrap();
        assert!(m.discard("a.txt"));
        assert!(!m.discard("a.txt"));
        assert!(!a.exists());
        assert!(b.exists());
    }

    #[test]
    fn drop_removes_scratch() {
        let dir = {
            let mut m = Materializer::new("o_r", None);
            m.write("a.txt", "a").unwrap();
            m.scratch_dir().unwrap().to_path_buf()
        };
        assert!(!dir.exists());
    }
}
