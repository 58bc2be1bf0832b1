//! Fixed ignore-pattern list for untracked paths.

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{VcsError, VcsResult};

/// Build artifacts, dependency caches and VCS metadata. A trailing `/`
/// marks a directory name matched at any depth.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git/",
    ".hg/",
    ".svn/",
    "node_modules/",
    "__pycache__/",
    ".venv/",
    "target/",
    "dist/",
    "build/",
    "*.pyc",
    "*.pyo",
    "*.o",
    "*.class",
    ".DS_Store",
];

/// Compiled ignore patterns.
#[derive(Clone, Debug)]
pub struct IgnoreRules {
    patterns: Vec<String>,
    set: GlobSet,
}

impl IgnoreRules {
    /// Compile a pattern list. Patterns without `/` match at any depth.
    pub fn new<I, S>(patterns: I) -> VcsResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            for glob in expand(pattern) {
                let compiled = Glob::new(&glob).map_err(|e| VcsError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                })?;
                builder.add(compiled);
            }
            kept.push(pattern.to_string());
        }
        let set = builder.build().map_err(|e| VcsError::InvalidPattern {
            pattern: kept.join(", "),
            reason: e.to_string(),
        })?;
        Ok(Self {
            patterns: kept,
            set,
        })
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        self.set.is_match(path)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in DEFAULT_IGNORE_PATTERNS {
            for glob in expand(pattern) {
                if let Ok(compiled) = Glob::new(&glob) {
                    builder.add(compiled);
                }
            }
        }
        Self {
            patterns: DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect(),
            set: builder.build().unwrap_or_else(|_| GlobSet::empty()),
        }
    }
}

fn expand(pattern: &str) -> Vec<String> {
    let anchored = pattern.starts_with('/');
    let body = pattern.trim_start_matches('/');
    match body.strip_suffix('/') {
        Some(dir) if anchored => vec![dir.to_string(), format!("{dir}/**")],
        Some(dir) => vec![format!("**/{dir}"), format!("**/{dir}/**")],
        None if anchored || body.contains('/') => vec![body.to_string()],
        None => vec![format!("**/{body}")],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules() {
        let rules = IgnoreRules::default();
        assert!(rules.is_ignored(".git/config"));
        assert!(rules.is_ignored("web/node_modules/react/index.js"));
        assert!(rules.is_ignored("node_modules"));
        assert!(rules.is_ignored("pkg/__pycache__/x.cpython-311.pyc"));
        assert!(rules.is_ignored("mod.pyc"));
        assert!(rules.is_ignored("a/b/.DS_Store"));
        assert!(rules.is_ignored("target/debug/app"));
        assert!(!rules.is_ignored("src/main.rs"));
        assert!(!rules.is_ignored("src/builder.rs"));
        assert!(!rules.is_ignored("docs/target.md"));
    }

    #[test]
    fn anchored_and_nested_patterns() {
        let rules = IgnoreRules::new(["/out/", "logs/*.log", "*.tmp"]).unwrap();
        assert!(rules.is_ignored("out/a.txt"));
        assert!(!rules.is_ignored("src/out/a.txt"));
        assert!(rules.is_ignored("logs/app.log"));
        assert!(rules.is_ignored("deep/x.tmp"));
        assert_eq!(rules.patterns().len(), 3);
    }

    #[test]
    fn bad_pattern_is_an_error() {
        let err = IgnoreRules::new(["a[", "ok"]).unwrap_err();
        assert!(matches!(err, VcsError::InvalidPattern { .. }));
    }
}
