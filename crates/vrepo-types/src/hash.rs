use crate::digest::Digest;

/// Lower bound of the mtime surrogate range (2001-09-09 in UNIX seconds).
pub const MTIME_SURROGATE_BASE: u64 = 1_000_000_000;
/// Width of the mtime surrogate range in seconds.
pub const MTIME_SURROGATE_SPAN: u64 = 600_000_000;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g. `"vrepo-commit-v1"`) that is
/// prepended to every hash computation, so a commit id and a proposal id
/// over identical bytes never collide.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for the deterministic mtime surrogate.
    pub const MTIME: Self = Self {
        domain: "vrepo-mtime-v1",
    };
    /// Hasher for synthetic commit identifiers.
    pub const COMMIT: Self = Self {
        domain: "vrepo-commit-v1",
    };
    /// Hasher for publish proposal identifiers.
    pub const PROPOSAL: Self = Self {
        domain: "vrepo-proposal-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        self.hash_parts(&[data])
    }

    /// Hash several byte strings, separated so that `("ab", "c")` and
    /// `("a", "bc")` produce different digests.
    pub fn hash_parts(&self, parts: &[&[u8]]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        for part in parts {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Verify that data produces the expected digest.
    pub fn verify(&self, data: &[u8], expected: &Digest) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }

    /// Stable stand-in for a file modification time.
    ///
    /// Derived from `(namespace, path)` only, so the value survives process
    /// restarts, and always lands in
    /// `[MTIME_SURROGATE_BASE, MTIME_SURROGATE_BASE + MTIME_SURROGATE_SPAN)`.
    pub fn mtime_surrogate(namespace: &str, path: &str) -> u64 {
        let digest = Self::MTIME.hash_parts(&[namespace.as_bytes(), path.as_bytes()]);
        MTIME_SURROGATE_BASE + digest.leading_u64() % MTIME_SURROGATE_SPAN
    }
}
