use std::fmt;

use serde::{Deserialize, Serialize};

/// Cache key namespaces, each with an independent default TTL tier.
///
/// | Category | Key shape | TTL tier |
/// |---|---|---|
/// | `Repository` | `repo:{repo_id}` | medium |
/// | `Session` | `session:{user_id}:{session_id}` | short |
/// | `User` | `user:{user_id}` | long |
/// | `Context` | `context:{session_id}:...` | short |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    Repository,
    Session,
    User,
    Context,
}

impl CacheCategory {
    /// Every category, in a stable order.
    pub const ALL: [CacheCategory; 4] = [
        CacheCategory::Repository,
        CacheCategory::Session,
        CacheCategory::User,
        CacheCategory::Context,
    ];

    /// Key prefix shared by every key in this category, including the
    /// trailing separator.
    pub fn prefix(self) -> &'static str {
        match self {
            CacheCategory::Repository => "repo:",
            CacheCategory::Session => "session:",
            CacheCategory::User => "user:",
            CacheCategory::Context => "context:",
        }
    }

    /// Classify a key by its prefix.
    pub fn of_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| key.starts_with(c.prefix()))
    }

    /// `repo:{repo_id}`
    pub fn repository_key(repo_id: &str) -> String {
        format!("repo:{repo_id}")
    }

    /// `session:{user_id}:{session_id}`
    pub fn session_key(user_id: &str, session_id: &str) -> String {
        format!("session:{user_id}:{session_id}")
    }

    /// `user:{user_id}`
    pub fn user_key(user_id: &str) -> String {
        format!("user:{user_id}")
    }

    /// `context:{session_id}:{name}`
    pub fn context_key(session_id: &str, name: &str) -> String {
        format!("context:{session_id}:{name}")
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CacheCategory::Repository => "repository",
            CacheCategory::Session => "session",
            CacheCategory::User => "user",
            CacheCategory::Context => "context",
        }
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
