//! Contracts for the services vrepo consumes but does not implement.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use vrepo_types::{RepoId, RepositorySnapshot};
use vrepo_vcs::FileDiff;

use crate::error::{SdkError, SdkResult};

/// Who is asking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Caller {
    pub user_id: String,
    /// Groups buffered writes and the one-time publish.
    pub session_id: String,
    /// Plan tier; `None` when the host could not determine it.
    pub tier: Option<String>,
}

impl Caller {
    /// A caller with a fresh session id.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: uuid::Uuid::now_v7().to_string(),
            tier: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }
}

/// Produces snapshots on a cache miss or corruption.
#[async_trait]
pub trait OriginFetcher: Send + Sync {
    async fn fetch(&self, repo: &RepoId) -> SdkResult<RepositorySnapshot>;

    /// Size estimate used for the entitlement check, if cheaply known.
    async fn estimate_size(&self, _repo: &RepoId) -> Option<u64> {
        None
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(String),
}

/// Tier-based access control.
#[async_trait]
pub trait EntitlementService: Send + Sync {
    /// An `Err` means the decision could not be made, which callers treat
    /// as allow.
    async fn validate_access(
        &self,
        repo: &RepoId,
        estimated_size: u64,
        caller: &Caller,
    ) -> SdkResult<AccessDecision>;
}

/// Grants everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

#[async_trait]
impl EntitlementService for AllowAll {
    async fn validate_access(&self, _: &RepoId, _: u64, _: &Caller) -> SdkResult<AccessDecision> {
        Ok(AccessDecision::Allow)
    }
}

/// Per-tier repository size limits.
#[derive(Clone, Debug, Default)]
pub struct TierSizeLimits {
    limits: HashMap<String, u64>,
}

impl TierSizeLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, tier: impl Into<String>, max_bytes: u64) -> Self {
        self.limits.insert(tier.into(), max_bytes);
        self
    }
}

#[async_trait]
impl EntitlementService for TierSizeLimits {
    async fn validate_access(
        &self,
        _repo: &RepoId,
        estimated_size: u64,
        caller: &Caller,
    ) -> SdkResult<AccessDecision> {
        let tier = caller
            .tier
            .as_deref()
            .ok_or_else(|| SdkError::EntitlementUnavailable("caller tier unknown".into()))?;
        let limit = self
            .limits
            .get(tier)
            .ok_or_else(|| SdkError::EntitlementUnavailable(format!("no limit for tier {tier:?}")))?;
        if estimated_size > *limit {
            return Ok(AccessDecision::Deny(format!(
                "repository is {estimated_size} bytes, {tier} tier allows {limit}"
            )));
        }
        Ok(AccessDecision::Allow)
    }
}

/// Buffered changes proposed upstream in one publish.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    /// Deterministic over repository, session, message and file contents.
    pub proposal_id: String,
    pub repo: RepoId,
    pub message: String,
    /// Path to new content; `None` is a deletion.
    pub files: BTreeMap<String, Option<String>>,
    pub diffs: Vec<FileDiff>,
}

/// Acknowledgement from the publisher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    pub proposal_id: String,
    /// Where the proposal can be found upstream.
    pub reference: String,
}

/// Proposes buffered changes upstream (e.g. as a pull request).
#[async_trait]
pub trait ChangePublisher: Send + Sync {
    async fn publish(&self, changes: &ChangeSet, caller: &Caller) -> SdkResult<PublishReceipt>;
}

impl fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessDecision::Allow => f.write_str("allow"),
            AccessDecision::Deny(reason) => write!(f, "deny: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoId {
        RepoId::new("o/r").unwrap()
    }

    #[test]
    fn callers_get_distinct_sessions() {
        let a = Caller::new("alice");
        let b = Caller::new("alice");
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(Caller::new("x").with_session("s1").session_id, "s1");
    }

    #[tokio::test]
    async fn tier_limits_allow_and_deny() {
        let limits = TierSizeLimits::new().limit("free", 1_000).limit("pro", 1_000_000);
        let free = Caller::new("u").with_tier("free");
        let pro = Caller::new("u").with_tier("pro");

        let denied = limits.validate_access(&repo(), 5_000, &free).await.unwrap();
        assert!(matches!(denied, AccessDecision::Deny(ref r) if r.contains("free")));
        let allowed = limits.validate_access(&repo(), 5_000, &pro).await.unwrap();
        assert_eq!(allowed, AccessDecision::Allow);
    }

    #[tokio::test]
    async fn unknown_tier_is_unavailable_not_denied() {
        let limits = TierSizeLimits::new().limit("free", 10);
        let anonymous = Caller::new("u");
        assert!(matches!(
            limits.validate_access(&repo(), 1, &anonymous).await,
            Err(SdkError::EntitlementUnavailable(_))
        ));
        let enterprise = Caller::new("u").with_tier("enterprise");
        assert!(limits.validate_access(&repo(), 1, &enterprise).await.is_err());
    }

    #[tokio::test]
    async fn allow_all_allows() {
        let d = AllowAll.validate_access(&repo(), u64::MAX, &Caller::new("u")).await.unwrap();
        assert_eq!(d, AccessDecision::Allow);
        assert_eq!(AccessDecision::Deny("too big".into()).to_string(), "deny: too big");
    }
}
