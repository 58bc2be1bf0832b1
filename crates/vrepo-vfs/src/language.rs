//! Extension → language mapping, binary detection and size buckets.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Language tag for files whose extension is not in the table.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

const EXTENSION_LANGUAGES: &[(&str, &str)] = &[
    ("py", "python"),
    ("pyi", "python"),
    ("rs", "rust"),
    ("js", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("kts", "kotlin"),
    ("scala", "scala"),
    ("go", "go"),
    ("c", "c"),
    ("h", "c"),
    ("cc", "cpp"),
    ("cpp", "cpp"),
    ("cxx", "cpp"),
    ("hpp", "cpp"),
    ("cs", "csharp"),
    ("rb", "ruby"),
    ("php", "php"),
    ("swift", "swift"),
    ("m", "objective-c"),
    ("sh", "shell"),
    ("bash", "shell"),
    ("zsh", "shell"),
    ("ps1", "powershell"),
    ("sql", "sql"),
    ("html", "html"),
    ("htm", "html"),
    ("css", "css"),
    ("scss", "scss"),
    ("less", "less"),
    ("vue", "vue"),
    ("svelte", "svelte"),
    ("json", "json"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("toml", "toml"),
    ("xml", "xml"),
    ("md", "markdown"),
    ("markdown", "markdown"),
    ("rst", "restructuredtext"),
    ("txt", "text"),
    ("ini", "ini"),
    ("cfg", "ini"),
    ("lua", "lua"),
    ("r", "r"),
    ("dart", "dart"),
    ("ex", "elixir"),
    ("exs", "elixir"),
    ("erl", "erlang"),
    ("hs", "haskell"),
    ("ml", "ocaml"),
    ("clj", "clojure"),
    ("proto", "protobuf"),
    ("graphql", "graphql"),
    ("tf", "terraform"),
    ("ipynb", "jupyter"),
];

const FILENAME_LANGUAGES: &[(&str, &str)] = &[
    ("Dockerfile", "dockerfile"),
    ("Makefile", "makefile"),
    ("CMakeLists.txt", "cmake"),
    ("Gemfile", "ruby"),
    ("Rakefile", "ruby"),
    ("Jenkinsfile", "groovy"),
];

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "pdf", "zip", "gz", "tgz", "bz2",
    "xz", "7z", "tar", "rar", "jar", "war", "class", "exe", "dll", "so", "dylib", "o", "a", "lib",
    "bin", "wasm", "pyc", "pyo", "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4", "wav",
    "ogg", "mov", "avi", "mkv", "sqlite", "db",
];

/// Language for a lowercased extension.
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    EXTENSION_LANGUAGES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, lang)| *lang)
}

/// Language for a file, by exact file name first and extension second.
pub fn language_for(name: &str, extension: Option<&str>) -> &'static str {
    if let Some((_, lang)) = FILENAME_LANGUAGES.iter().find(|(n, _)| *n == name) {
        return lang;
    }
    extension
        .and_then(language_for_extension)
        .unwrap_or(UNKNOWN_LANGUAGE)
}

/// Whether an extension denotes a binary format.
pub fn is_binary_extension(ext: &str) -> bool {
    BINARY_EXTENSIONS.contains(&ext)
}

/// Whether content looks binary (contains NUL bytes).
pub fn looks_binary(content: &str) -> bool {
    content.as_bytes().contains(&0)
}

/// Coarse file size classes used by the size index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeBucket {
    /// Under 1 KiB.
    Tiny,
    /// Under 10 KiB.
    Small,
    /// Under 100 KiB.
    Medium,
    /// Under 1 MiB.
    Large,
    /// 1 MiB and above.
    Huge,
}

impl SizeBucket {
    pub const ALL: [SizeBucket; 5] = [
        SizeBucket::Tiny,
        SizeBucket::Small,
        SizeBucket::Medium,
        SizeBucket::Large,
        SizeBucket::Huge,
    ];

    pub fn for_size(size: u64) -> Self {
        const KIB: u64 = 1024;
        match size {
            s if s < KIB => SizeBucket::Tiny,
            s if s < 10 * KIB => SizeBucket::Small,
            s if s < 100 * KIB => SizeBucket::Medium,
            s if s < 1024 * KIB => SizeBucket::Large,
            _ => SizeBucket::Huge,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SizeBucket::Tiny => "tiny",
            SizeBucket::Small => "small",
            SizeBucket::Medium => "medium",
            SizeBucket::Large => "large",
            SizeBucket::Huge => "huge",
        }
    }
}

impl fmt::Display for SizeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_lookup() {
        assert_eq!(language_for_extension("py"), Some("python"));
        assert_eq!(language_for_extension("rs"), Some("rust"));
        assert_eq!(language_for_extension("zzz"), None);
    }

    #[test]
    fn filename_beats_extension() {
        assert_eq!(language_for("CMakeLists.txt", Some("txt")), "cmake");
        assert_eq!(language_for("notes.txt", Some("txt")), "text");
        assert_eq!(language_for("Dockerfile", None), "dockerfile");
        assert_eq!(language_for("LICENSE", None), UNKNOWN_LANGUAGE);
    }

    #[test]
    fn binary_detection() {
        assert!(is_binary_extension("png"));
        assert!(!is_binary_extension("py"));
        assert!(looks_binary("a\0b"));
        assert!(!looks_binary("plain"));
    }

    #[test]
    fn size_bucket_boundaries() {
        assert_eq!(SizeBucket::for_size(0), SizeBucket::Tiny);
        assert_eq!(SizeBucket::for_size(1023), SizeBucket::Tiny);
        assert_eq!(SizeBucket::for_size(1024), SizeBucket::Small);
        assert_eq!(SizeBucket::for_size(10 * 1024 - 1), SizeBucket::Small);
        assert_eq!(SizeBucket::for_size(10 * 1024), SizeBucket::Medium);
        assert_eq!(SizeBucket::for_size(100 * 1024), SizeBucket::Large);
        assert_eq!(SizeBucket::for_size(1024 * 1024 - 1), SizeBucket::Large);
        assert_eq!(SizeBucket::for_size(1024 * 1024), SizeBucket::Huge);
    }
}
