//! Path normalization for virtual paths.
//!
//! Virtual paths are `/`-separated, relative to the repository root, with no
//! leading `./` or `/`, no trailing `/` and no `.`/empty segments. The root
//! directory is the empty string.

/// Normalize a user- or snapshot-supplied path.
///
/// Backslashes become `/`, `.` and empty segments are dropped and `..` pops
/// the previous segment (never above the root).
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    let unified = path.trim().replace('\\', "/");
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Parent directory of a normalized path (`""` for top-level entries).
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Final component of a normalized path.
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Lowercased extension of a file name, without the dot.
///
/// Dotfiles such as `.gitignore` have no extension.
pub fn extension(name: &str) -> Option<String> {
    let stem_start = usize::from(name.starts_with('.'));
    let idx = name[stem_start..].rfind('.')? + stem_start;
    let ext = &name[idx + 1..];
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

/// Every ancestor directory of a normalized path, nearest first, excluding
/// the root.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    let mut current = parent(path);
    std::iter::from_fn(move || {
        if current.is_empty() {
            None
        } else {
            let dir = current;
            current = parent(current);
            Some(dir)
        }
    })
}

/// Join a directory and a child name.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}
