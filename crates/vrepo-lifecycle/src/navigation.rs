//! Page-transition driven cache invalidation.
//!
//! The hosting application reports every page change. Leaving a part of the
//! product makes the caches that served it stale, so each `(from, to)` pair
//! of page types maps to the categories to clear. Pairs absent from the
//! table clear nothing.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vrepo_types::CacheCategory;

use crate::manager::CacheLifecycleManager;

/// Top-level product area a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Home,
    Chat,
    Repositories,
    Account,
    Docs,
}

/// Classification of a page for invalidation purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    Landing,
    Dashboard,
    ChatHub,
    ChatSession,
    RepositoryHub,
    RepositoryDetail,
    Settings,
    Profile,
    Docs,
    Unknown,
}

impl PageType {
    pub const ALL: [PageType; 10] = [
        PageType::Landing,
        PageType::Dashboard,
        PageType::ChatHub,
        PageType::ChatSession,
        PageType::RepositoryHub,
        PageType::RepositoryDetail,
        PageType::Settings,
        PageType::Profile,
        PageType::Docs,
        PageType::Unknown,
    ];

    pub fn section(self) -> Option<Section> {
        match self {
            PageType::Landing | PageType::Dashboard => Some(Section::Home),
            PageType::ChatHub | PageType::ChatSession => Some(Section::Chat),
            PageType::RepositoryHub | PageType::RepositoryDetail => Some(Section::Repositories),
            PageType::Settings | PageType::Profile => Some(Section::Account),
            PageType::Docs => Some(Section::Docs),
            PageType::Unknown => None,
        }
    }

    /// Entry page of a section.
    pub fn is_hub(self) -> bool {
        matches!(
            self,
            PageType::Landing
                | PageType::Dashboard
                | PageType::ChatHub
                | PageType::RepositoryHub
                | PageType::Docs
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PageType::Landing => "landing",
            PageType::Dashboard => "dashboard",
            PageType::ChatHub => "chat_hub",
            PageType::ChatSession => "chat_session",
            PageType::RepositoryHub => "repository_hub",
            PageType::RepositoryDetail => "repository_detail",
            PageType::Settings => "settings",
            PageType::Profile => "profile",
            PageType::Docs => "docs",
            PageType::Unknown => "unknown",
        }
    }

    /// Classify a route (`/chat/42`, `/repos/o/r`) or a page type name
    /// (`chat_session`). Anything unrecognized is `Unknown`.
    pub fn parse(input: &str) -> PageType {
        let input = input.trim();
        if let Some(page) = PageType::ALL.into_iter().find(|p| p.as_str() == input) {
            return page;
        }

        let route = input.split(['?', '#']).next().unwrap_or_default();
        let mut segments = route.split('/').filter(|s| !s.is_empty());
        let head = segments.next();
        let has_more = segments.next().is_some();
        match head {
            None => PageType::Landing,
            Some("home" | "dashboard") => PageType::Dashboard,
            Some("chat" | "chats") if has_more => PageType::ChatSession,
            Some("chat" | "chats") => PageType::ChatHub,
            Some("repos" | "repositories" | "repo") if has_more => PageType::RepositoryDetail,
            Some("repos" | "repositories" | "repo") => PageType::RepositoryHub,
            Some("settings") => PageType::Settings,
            Some("profile" | "account") => PageType::Profile,
            Some("docs" | "help") => PageType::Docs,
            Some(_) => PageType::Unknown,
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(from, to)` → categories to clear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionTable {
    rules: HashMap<(PageType, PageType), Vec<CacheCategory>>,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the rule for one pair. Categories are deduplicated.
    pub fn rule(mut self, from: PageType, to: PageType, categories: &[CacheCategory]) -> Self {
        let mut categories = categories.to_vec();
        categories.sort();
        categories.dedup();
        self.rules.insert((from, to), categories);
        self
    }

    pub fn categories_for(&self, from: PageType, to: PageType) -> &[CacheCategory] {
        self.rules.get(&(from, to)).map_or(&[], Vec::as_slice)
    }

    /// Every configured pair with its categories.
    pub fn pairs(&self) -> impl Iterator<Item = (PageType, PageType, &[CacheCategory])> {
        self.rules
            .iter()
            .map(|(&(from, to), cats)| (from, to, cats.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl TransitionTable {
    /// The product's standard rules.
    ///
    /// Leaving a chat session for another section drops the repository
    /// snapshots and session state it loaded; leaving it for the chat hub
    /// only drops its assembled context. Leaving account pages refreshes
    /// user data. Going back to the landing page drops everything
    /// session-scoped. Moves inside one section clear nothing.
    pub fn standard() -> Self {
        use CacheCategory::{Context, Repository, Session, User};
        use PageType::*;

        let mut table = TransitionTable::new().rule(ChatSession, ChatHub, &[Context]);
        for hub in [Dashboard, RepositoryHub, Settings, Docs] {
            table = table.rule(ChatSession, hub, &[Repository, Session]);
        }
        table = table.rule(ChatSession, Landing, &[Repository, Session, Context]);

        for away in [Dashboard, ChatHub, Settings, Docs] {
            table = table.rule(RepositoryDetail, away, &[Repository]);
        }
        table = table.rule(RepositoryDetail, Landing, &[Repository, Session, Context]);

        for from in [Settings, Profile] {
            for to in [Dashboard, ChatHub, RepositoryHub] {
                table = table.rule(from, to, &[User]);
            }
        }

        for from in [ChatHub, RepositoryHub, Settings, Profile, Docs] {
            table = table.rule(from, Landing, &[Session, Context]);
        }
        table
    }
}

/// One reported page change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationEvent {
    pub user_id: String,
    pub from: PageType,
    pub to: PageType,
    pub at: DateTime<Utc>,
    pub session_id: Option<String>,
    pub repo_id: Option<String>,
}

impl NavigationEvent {
    pub fn new(user_id: impl Into<String>, from: PageType, to: PageType) -> Self {
        Self {
            user_id: user_id.into(),
            from,
            to,
            at: Utc::now(),
            session_id: None,
            repo_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_repo(mut self, repo_id: impl Into<String>) -> Self {
        self.repo_id = Some(repo_id.into());
        self
    }
}

/// What a transition cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    pub from: PageType,
    pub to: PageType,
    pub categories: Vec<CacheCategory>,
    pub keys_removed: usize,
}

impl InvalidationReport {
    pub fn cleared(&self, category: CacheCategory) -> bool {
        self.categories.contains(&category)
    }
}

/// Clears cache categories on page transitions.
///
/// Clearing is scoped where the event allows it: sessions to the user,
/// context to the session, repositories to the repository. Without a
/// scope the whole category goes.
pub struct NavigationInvalidator {
    lifecycle: CacheLifecycleManager,
    table: TransitionTable,
    history: Mutex<VecDeque<NavigationEvent>>,
    history_limit: usize,
}

pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

impl NavigationInvalidator {
    pub fn new(lifecycle: CacheLifecycleManager) -> Self {
        Self::with_rules(lifecycle, TransitionTable::standard())
    }

    pub fn with_rules(lifecycle: CacheLifecycleManager, table: TransitionTable) -> Self {
        Self {
            lifecycle,
            table,
            history: Mutex::new(VecDeque::new()),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Keep at most `limit` events (at least one).
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub async fn on_transition(&self, event: NavigationEvent) -> InvalidationReport {
        let categories = self.table.categories_for(event.from, event.to).to_vec();
        let mut keys_removed = 0;
        for &category in &categories {
            keys_removed += self.clear(category, &event).await;
        }

        if categories.is_empty() {
            debug!(user = %event.user_id, from = %event.from, to = %event.to, "navigation clears nothing");
        } else {
            info!(
                user = %event.user_id,
                from = %event.from,
                to = %event.to,
                categories = ?categories,
                keys_removed,
                "navigation invalidated caches"
            );
        }

        let report = InvalidationReport {
            from: event.from,
            to: event.to,
            categories,
            keys_removed,
        };
        self.record(event);
        report
    }

    /// Convenience for route strings.
    pub async fn on_page_change(&self, user_id: &str, from: &str, to: &str) -> InvalidationReport {
        self.on_transition(NavigationEvent::new(
            user_id,
            PageType::parse(from),
            PageType::parse(to),
        ))
        .await
    }

    async fn clear(&self, category: CacheCategory, event: &NavigationEvent) -> usize {
        let scope = match category {
            CacheCategory::Repository => event.repo_id.as_deref(),
            CacheCategory::Session | CacheCategory::User => Some(event.user_id.as_str()),
            CacheCategory::Context => event.session_id.as_deref(),
        };
        match scope {
            Some(scope) => self.lifecycle.invalidate_scoped(category, scope).await,
            None => self.lifecycle.invalidate_category(category).await,
        }
    }

    fn record(&self, event: NavigationEvent) {
        let mut history = self.history.lock().expect("navigation history lock poisoned");
        while history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(event);
    }

    /// The user's most recent events, newest first.
    pub fn recent_events(&self, user_id: &str, limit: usize) -> Vec<NavigationEvent> {
        self.history
            .lock()
            .expect("navigation history lock poisoned")
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().expect("navigation history lock poisoned").len()
    }
}

impl fmt::Debug for NavigationInvalidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationInvalidator")
            .field("rules", &self.table.len())
            .field("history", &self.history_len())
            .field("history_limit", &self.history_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vrepo_store::{InMemoryKeyValueStore, KeyValueStore};

    use crate::manager::LifecycleConfig;

    const KEYS: [&str; 5] = [
        "repo:o/r",
        "session:alice:s1",
        "user:alice",
        "context:s1:files",
        "context:s1:summary",
    ];

    async fn seeded() -> (Arc<InMemoryKeyValueStore>, NavigationInvalidator) {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let lifecycle = CacheLifecycleManager::new(kv.clone(), LifecycleConfig::default());
        for key in KEYS {
            lifecycle.set(key, b"v".to_vec()).await.unwrap();
        }
        (kv, NavigationInvalidator::new(lifecycle))
    }

    async fn surviving(kv: &InMemoryKeyValueStore, category: CacheCategory) -> usize {
        kv.keys_with_prefix(category.prefix()).await.unwrap().len()
    }

    // ------------------------------------------------------------------
    // Classification
    // ------------------------------------------------------------------

    #[test]
    fn routes_classify() {
        assert_eq!(PageType::parse("/"), PageType::Landing);
        assert_eq!(PageType::parse(""), PageType::Landing);
        assert_eq!(PageType::parse("/dashboard"), PageType::Dashboard);
        assert_eq!(PageType::parse("/chat"), PageType::ChatHub);
        assert_eq!(PageType::parse("/chat/42?tab=files"), PageType::ChatSession);
        assert_eq!(PageType::parse("/repos"), PageType::RepositoryHub);
        assert_eq!(PageType::parse("/repos/owner/name"), PageType::RepositoryDetail);
        assert_eq!(PageType::parse("/settings/billing"), PageType::Settings);
        assert_eq!(PageType::parse("/docs/intro#top"), PageType::Docs);
        assert_eq!(PageType::parse("/pricing"), PageType::Unknown);
    }

    #[test]
    fn names_classify() {
        for page in PageType::ALL {
            assert_eq!(PageType::parse(page.as_str()), page);
        }
    }

    #[test]
    fn sections_group_pages() {
        assert_eq!(PageType::ChatSession.section(), PageType::ChatHub.section());
        assert_ne!(PageType::ChatSession.section(), PageType::Dashboard.section());
        assert_eq!(PageType::Unknown.section(), None);
        assert!(PageType::RepositoryHub.is_hub());
        assert!(!PageType::RepositoryDetail.is_hub());
    }

    // ------------------------------------------------------------------
    // Table
    // ------------------------------------------------------------------

    #[test]
    fn unconfigured_pairs_clear_nothing() {
        let table = TransitionTable::standard();
        assert!(table.categories_for(PageType::ChatSession, PageType::ChatSession).is_empty());
        assert!(table.categories_for(PageType::Settings, PageType::Profile).is_empty());
        assert!(table.categories_for(PageType::Unknown, PageType::Dashboard).is_empty());
    }

    #[test]
    fn same_section_pairs_are_never_configured() {
        for (from, to, _) in TransitionTable::standard().pairs() {
            let same = from.section().is_some() && from.section() == to.section();
            let chat_session_to_hub = from == PageType::ChatSession && to == PageType::ChatHub;
            assert!(!same || chat_session_to_hub, "{from} -> {to}");
        }
    }

    #[test]
    fn rule_deduplicates() {
        let table = TransitionTable::new().rule(
            PageType::Docs,
            PageType::Dashboard,
            &[CacheCategory::User, CacheCategory::User],
        );
        assert_eq!(
            table.categories_for(PageType::Docs, PageType::Dashboard),
            &[CacheCategory::User]
        );
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn chat_session_to_unrelated_hub_clears_repository_and_session() {
        let (kv, nav) = seeded().await;
        let report = nav
            .on_transition(NavigationEvent::new("alice", PageType::ChatSession, PageType::Dashboard))
            .await;
        assert_eq!(report.categories, vec![CacheCategory::Repository, CacheCategory::Session]);
        assert_eq!(report.keys_removed, 2);
        assert_eq!(surviving(&kv, CacheCategory::Repository).await, 0);
        assert_eq!(surviving(&kv, CacheCategory::Session).await, 0);
        assert_eq!(surviving(&kv, CacheCategory::User).await, 1);
        assert_eq!(surviving(&kv, CacheCategory::Context).await, 2);
    }

    #[tokio::test]
    async fn sub_pages_of_one_section_clear_nothing() {
        let (kv, nav) = seeded().await;
        let report = nav.on_page_change("alice", "/repos/o/r", "/repos").await;
        assert!(report.categories.is_empty());
        assert_eq!(report.keys_removed, 0);
        assert_eq!(kv.len(), KEYS.len());

        let report = nav.on_page_change("alice", "/settings", "/profile").await;
        assert!(report.categories.is_empty());
        assert_eq!(kv.len(), KEYS.len());
    }

    #[tokio::test]
    async fn every_configured_pair_clears_exactly_its_categories() {
        let table = TransitionTable::standard();
        for (from, to, expected) in table.pairs() {
            let (kv, nav) = seeded().await;
            let report = nav
                .on_transition(NavigationEvent::new("alice", from, to))
                .await;
            assert_eq!(report.categories, expected, "{from} -> {to}");
            for category in CacheCategory::ALL {
                let left = surviving(&kv, category).await;
                if expected.contains(&category) {
                    assert_eq!(left, 0, "{from} -> {to} kept {category}");
                } else {
                    assert!(left > 0, "{from} -> {to} cleared {category}");
                }
            }
        }
    }

    #[tokio::test]
    async fn scopes_limit_what_is_cleared() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let lifecycle = CacheLifecycleManager::new(kv.clone(), LifecycleConfig::default());
        for key in ["repo:o/a", "repo:o/b", "context:s1:x", "context:s2:x"] {
            lifecycle.set(key, b"v".to_vec()).await.unwrap();
        }
        let nav = NavigationInvalidator::new(lifecycle);
        let event = NavigationEvent::new("alice", PageType::ChatSession, PageType::Landing)
            .with_session("s1")
            .with_repo("o/a");
        let report = nav.on_transition(event).await;
        assert_eq!(report.keys_removed, 2);
        assert_eq!(
            kv.keys_with_prefix("").await.unwrap(),
            vec!["context:s2:x".to_string(), "repo:o/b".to_string()]
        );
    }

    #[tokio::test]
    async fn custom_rules_replace_defaults() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let lifecycle = CacheLifecycleManager::new(kv.clone(), LifecycleConfig::default());
        lifecycle.set("user:alice", b"v".to_vec()).await.unwrap();
        lifecycle.set("repo:o/r", b"v".to_vec()).await.unwrap();
        let table = TransitionTable::new().rule(PageType::Docs, PageType::Docs, &[CacheCategory::User]);
        let nav = NavigationInvalidator::with_rules(lifecycle, table);

        let none = nav
            .on_transition(NavigationEvent::new("alice", PageType::ChatSession, PageType::Dashboard))
            .await;
        assert!(none.categories.is_empty());
        let some = nav
            .on_transition(NavigationEvent::new("alice", PageType::Docs, PageType::Docs))
            .await;
        assert!(some.cleared(CacheCategory::User));
        assert_eq!(kv.keys_with_prefix("").await.unwrap(), vec!["repo:o/r".to_string()]);
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn history_is_bounded_and_per_user() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let lifecycle = CacheLifecycleManager::new(kv, LifecycleConfig::default());
        let nav = NavigationInvalidator::new(lifecycle).with_history_limit(3);

        nav.on_page_change("alice", "/", "/chat").await;
        nav.on_page_change("bob", "/", "/docs").await;
        nav.on_page_change("alice", "/chat", "/chat/1").await;
        nav.on_page_change("alice", "/chat/1", "/dashboard").await;

        assert_eq!(nav.history_len(), 3);
        let recent = nav.recent_events("alice", 10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].to, PageType::Dashboard);
        assert_eq!(recent[1].to, PageType::ChatSession);
        assert_eq!(nav.recent_events("bob", 10).len(), 1);
        assert_eq!(nav.recent_events("alice", 1).len(), 1);
    }
}
