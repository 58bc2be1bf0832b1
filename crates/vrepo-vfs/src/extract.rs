//! Splits a snapshot content blob into per-file locations.
//!
//! # Format
//!
//! ```text
//! ================================================
//! FILE: src/main.py
//! ================================================
//! print("hello")
//!
//! FILE: README.md
//! # Title
//! ```
//!
//! A section starts at a `FILE: <path>` header line, optionally framed by
//! separator lines of three or more `=`. Its body runs to the next header
//! (or that header's leading separator) with trailing newlines excluded.
//!
//! Fenced code blocks (lines starting with three backticks) are tracked so
//! that a `FILE:` line quoted inside a code sample is read as body text. A
//! fully framed header inside a fence is a boundary only when the listing
//! names its path as a file, which recovers from an unclosed fence; it then
//! resets the fence state.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};
use vrepo_types::{Digest, FileLocation, FILE_HEADER_PREFIX};

use crate::listing::TreeListing;
use crate::path;

const FENCE: &str = "```";

/// Per-extraction counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    /// Sections found in the blob, including duplicates.
    pub sections: usize,
    /// Sections whose path appeared earlier; the later one wins.
    pub duplicates: usize,
    /// Files whose checksum disagreed with the listing.
    pub checksum_mismatches: usize,
    /// Listing files that had no section in the blob.
    pub missing_from_content: usize,
}

/// Result of one extraction pass.
#[derive(Clone, Debug, Default)]
pub struct Extraction {
    /// Locations in blob order, one per unique path.
    pub locations: Vec<FileLocation>,
    pub report: ExtractionReport,
}

impl Extraction {
    pub fn get(&self, path: &str) -> Option<&FileLocation> {
        self.locations.iter().find(|loc| loc.path == path)
    }
}

#[derive(Clone, Copy)]
struct Line<'a> {
    start: usize,
    text: &'a str,
}

/// Stateless content blob parser.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    /// Extract every file section from `content`.
    ///
    /// Checksum mismatches against `listing` are logged and counted but the
    /// content is still returned.
    pub fn extract(content: &str, listing: &TreeListing) -> Extraction {
        let lines = split_lines(content);
        let mut sections: Vec<(String, usize, usize)> = Vec::new();
        let mut open: Option<(String, usize)> = None;
        let mut in_fence = false;
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];

            if let Some(header) = framed_header(&lines, i)
                .filter(|h| !in_fence || listed_file(listing, h))
            {
                close(&mut sections, open.take(), line.start, content);
                in_fence = false;
                let body_start = lines.get(i + 3).map_or(content.len(), |l| l.start);
                open = Some((header, body_start));
                i += 3;
                continue;
            }

            if !in_fence {
                if let Some(header) = header_path(line.text) {
                    let boundary = match i.checked_sub(1).map(|p| lines[p]) {
                        Some(prev) if open.is_some() && is_separator(prev.text) => prev.start,
                        _ => line.start,
                    };
                    close(&mut sections, open.take(), boundary, content);
                    let mut next = i + 1;
                    if lines.get(next).is_some_and(|l| is_separator(l.text)) {
                        next += 1;
                    }
                    let body_start = lines.get(next).map_or(content.len(), |l| l.start);
                    open = Some((header, body_start));
                    i = next;
                    continue;
                }
            }

            if open.is_some() && line.text.trim_start().starts_with(FENCE) {
                in_fence = !in_fence;
            }
            i += 1;
        }
        close(&mut sections, open.take(), content.len(), content);

        Self::locate(content, listing, sections)
    }

    fn locate(
        content: &str,
        listing: &TreeListing,
        sections: Vec<(String, usize, usize)>,
    ) -> Extraction {
        let mut report = ExtractionReport {
            sections: sections.len(),
            ..ExtractionReport::default()
        };
        let mut slot: HashMap<String, usize> = HashMap::new();
        let mut locations: Vec<FileLocation> = Vec::new();
        let root_prefix = listing.root().map(|r| format!("{r}/"));

        for (raw_path, start, end) in sections {
            let mut file_path = path::normalize(&raw_path);
            if let Some(prefix) = &root_prefix {
                if let Some(rest) = file_path.strip_prefix(prefix.as_str()) {
                    file_path = rest.to_string();
                }
            }
            if file_path.is_empty() {
                continue;
            }

            let body = &content[start..end];
            let checksum = Digest::of(body.as_bytes());
            if let Some(expected) = listing.checksum_for(&file_path) {
                if *expected != checksum {
                    report.checksum_mismatches += 1;
                    warn!(
                        path = %file_path,
                        expected = %expected.short_hex(),
                        actual = %checksum.short_hex(),
                        "checksum mismatch, serving content as-is"
                    );
                }
            }

            let location = FileLocation {
                path: file_path.clone(),
                start,
                end,
                size: body.len() as u64,
                checksum,
            };
            match slot.get(&file_path) {
                Some(&idx) => {
                    report.duplicates += 1;
                    warn!(path = %file_path, "duplicate file section, keeping the last one");
                    locations[idx] = location;
                }
                None => {
                    slot.insert(file_path, locations.len());
                    locations.push(location);
                }
            }
        }

        report.missing_from_content = listing
            .files()
            .filter(|entry| !slot.contains_key(&entry.path))
            .count();
        debug!(
            files = locations.len(),
            sections = report.sections,
            duplicates = report.duplicates,
            missing = report.missing_from_content,
            "content blob extracted"
        );
        Extraction { locations, report }
    }
}

fn split_lines(content: &str) -> Vec<Line<'_>> {
    let mut offset = 0;
    content
        .split_inclusive('\n')
        .map(|raw| {
            let start = offset;
            offset += raw.len();
            Line {
                start,
                text: raw.trim_end_matches(['\n', '\r']),
            }
        })
        .collect()
}

fn is_separator(text: &str) -> bool {
    let t = text.trim();
    t.len() >= 3 && t.bytes().all(|b| b == b'=')
}

fn header_path(text: &str) -> Option<String> {
    let rest = text.trim().strip_prefix(FILE_HEADER_PREFIX)?;
    let path = rest.trim();
    (!path.is_empty()).then(|| path.to_string())
}

/// Whether a raw header path names a file in the listing, after the same
/// normalization and root stripping applied to section paths.
fn listed_file(listing: &TreeListing, raw_path: &str) -> bool {
    let file_path = path::normalize(raw_path);
    let stripped = listing
        .root()
        .and_then(|root| file_path.strip_prefix(root)?.strip_prefix('/'))
        .unwrap_or(file_path.as_str());
    listing.contains_file(stripped)
}

fn framed_header(lines: &[Line<'_>], i: usize) -> Option<String> {
    let (sep, header, closing) = (lines.get(i)?, lines.get(i + 1)?, lines.get(i + 2)?);
    if is_separator(sep.text) && is_separator(closing.text) {
        header_path(header.text)
    } else {
        None
    }
}

fn close(
    sections: &mut Vec<(String, usize, usize)>,
    open: Option<(String, usize)>,
    boundary: usize,
    content: &str,
) {
    let Some((path, start)) = open else {
        return;
    };
    let bytes = content.as_bytes();
    let mut end = boundary.max(start);
    while end > start && matches!(bytes[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    sections.push((path, start, end));
}
