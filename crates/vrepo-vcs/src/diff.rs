//! Line diffs between the committed and working versions of a file.

use std::fmt::Write as _;

use serde::Serialize;
use similar::{ChangeTag, TextDiff};

const CONTEXT_LINES: usize = 3;

/// Diff of one file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub path: String,
    pub hunks: Vec<DiffHunk>,
    /// Either side contained NUL bytes; hunks are a size summary.
    pub binary: bool,
}

impl FileDiff {
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    pub fn additions(&self) -> usize {
        self.count(|l| matches!(l, DiffLine::Added(_)))
    }

    pub fn deletions(&self) -> usize {
        self.count(|l| matches!(l, DiffLine::Removed(_)))
    }

    fn count(&self, pred: impl Fn(&DiffLine) -> bool) -> usize {
        self.hunks
            .iter()
            .flat_map(|h| &h.lines)
            .filter(|l| pred(l))
            .count()
    }

    /// Render in unified diff format with `a/` and `b/` path prefixes.
    pub fn to_unified(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "--- a/{}", self.path);
        let _ = writeln!(out, "+++ b/{}", self.path);
        for hunk in &self.hunks {
            let _ = writeln!(
                out,
                "@@ -{},{} +{},{} @@",
                hunk.old_start, hunk.old_count, hunk.new_start, hunk.new_count
            );
            for line in &hunk.lines {
                let (sign, text) = match line {
                    DiffLine::Context(t) => (' ', t),
                    DiffLine::Added(t) => ('+', t),
                    DiffLine::Removed(t) => ('-', t),
                };
                let _ = writeln!(out, "{sign}{text}");
            }
        }
        out
    }
}

/// A contiguous region of changes with surrounding context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DiffHunk {
    /// 1-based; 0 when the old side is empty.
    pub old_start: usize,
    pub old_count: usize,
    /// 1-based; 0 when the new side is empty.
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<DiffLine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum DiffLine {
    Context(String),
    Added(String),
    Removed(String),
}

/// Diff two versions of a file. `None` stands for "absent" on that side.
pub fn diff_text(path: &str, old: Option<&str>, new: Option<&str>) -> FileDiff {
    let (old, new) = (old.unwrap_or(""), new.unwrap_or(""));
    if old.contains('\0') || new.contains('\0') {
        return binary_diff(path, old, new);
    }
    if old == new {
        return FileDiff {
            path: path.to_string(),
            hunks: Vec::new(),
            binary: false,
        };
    }

    let text_diff = TextDiff::from_lines(old, new);
    let hunks = text_diff
        .grouped_ops(CONTEXT_LINES)
        .iter()
        .map(|group| {
            let mut hunk = DiffHunk {
                old_start: 0,
                old_count: 0,
                new_start: 0,
                new_count: 0,
                lines: Vec::new(),
            };
            if let (Some(first), Some(last)) = (group.first(), group.last()) {
                let old_range = first.old_range().start..last.old_range().end;
                let new_range = first.new_range().start..last.new_range().end;
                hunk.old_count = old_range.len();
                hunk.new_count = new_range.len();
                hunk.old_start = if hunk.old_count == 0 { old_range.start } else { old_range.start + 1 };
                hunk.new_start = if hunk.new_count == 0 { new_range.start } else { new_range.start + 1 };
            }
            for op in group {
                for change in text_diff.iter_changes(op) {
                    let text = change.value().trim_end_matches(['\n', '\r']).to_string();
                    hunk.lines.push(match change.tag() {
                        ChangeTag::Equal => DiffLine::Context(text),
                        ChangeTag::Delete => DiffLine::Removed(text),
                        ChangeTag::Insert => DiffLine::Added(text),
                    });
                }
            }
            hunk
        })
        .collect();

    FileDiff {
        path: path.to_string(),
        hunks,
        binary: false,
    }
}

fn binary_diff(path: &str, old: &str, new: &str) -> FileDiff {
    let mut lines = Vec::new();
    if !old.is_empty() {
        lines.push(DiffLine::Removed(format!("(binary content, {} bytes)", old.len())));
    }
    if !new.is_empty() {
        lines.push(DiffLine::Added(format!("(binary content, {} bytes)", new.len())));
    }
    let hunks = if old == new {
        Vec::new()
    } else {
        vec![DiffHunk {
            old_start: usize::from(!old.is_empty()),
            old_count: usize::from(!old.is_empty()),
            new_start: usize::from(!new.is_empty()),
            new_count: usize::from(!new.is_empty()),
            lines,
        }]
    };
    FileDiff {
        path: path.to_string(),
        hunks,
        binary: true,
    }
}
