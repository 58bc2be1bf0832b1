//! TOML-loadable configuration for a vrepo deployment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vrepo_cache::CacheConfig;
use vrepo_lifecycle::{
    CategoryTtls, HealthThresholds, LifecycleConfig, MemoryPressureThresholds, SchedulerConfig,
};
use vrepo_types::MAX_TTL;

use crate::error::{SdkError, SdkResult};

/// Top-level configuration. Every field has a default, so an empty file is
/// a valid configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VrepoConfig {
    /// Parent directory for materialized files. A temporary directory per
    /// repository manager when unset.
    pub materialize_root: Option<PathBuf>,
    pub navigation_history_limit: usize,
    pub cache: CacheSection,
    pub ttl: TtlSection,
    pub memory: MemorySection,
    pub scheduler: SchedulerSection,
    pub health: HealthSection,
}

impl Default for VrepoConfig {
    fn default() -> Self {
        Self {
            materialize_root: None,
            navigation_history_limit: 1000,
            cache: CacheSection::default(),
            ttl: TtlSection::default(),
            memory: MemorySection::default(),
            scheduler: SchedulerSection::default(),
            health: HealthSection::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub max_entries: usize,
    pub max_bytes: usize,
    pub default_ttl_secs: u64,
    /// Files pre-loaded into the content cache when a repository opens.
    pub warm_limit: usize,
    pub warm_max_file_bytes: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_bytes: 64 * 1024 * 1024,
            default_ttl_secs: 1800,
            warm_limit: 50,
            warm_max_file_bytes: 10 * 1024,
        }
    }
}

/// Per-category TTLs in seconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlSection {
    pub repository: u64,
    pub session: u64,
    pub user: u64,
    pub context: u64,
}

impl Default for TtlSection {
    fn default() -> Self {
        Self {
            repository: 3600,
            session: 1800,
            user: 86400,
            context: 900,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub budget_bytes: u64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for MemorySection {
    fn default() -> Self {
        let thresholds = MemoryPressureThresholds::default();
        Self {
            budget_bytes: 256 * 1024 * 1024,
            medium: thresholds.medium,
            high: thresholds.high,
            critical: thresholds.critical,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub sweep_interval_secs: u64,
    pub memory_interval_secs: u64,
    pub health_interval_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub history_limit: usize,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
            memory_interval_secs: 600,
            health_interval_secs: 60,
            shutdown_timeout_secs: 10,
            history_limit: 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSection {
    pub degraded_latency_ms: u64,
    pub unhealthy_latency_ms: u64,
    pub degraded_errors: usize,
    pub unhealthy_errors: usize,
    pub error_window_secs: u64,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            degraded_latency_ms: 500,
            unhealthy_latency_ms: 2000,
            degraded_errors: 5,
            unhealthy_errors: 20,
            error_window_secs: 300,
        }
    }
}

impl VrepoConfig {
    pub fn from_toml_str(raw: &str) -> SdkResult<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| SdkError::Config(e.message().to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SdkError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> SdkResult<String> {
        toml::to_string_pretty(self).map_err(|e| SdkError::Config(e.to_string()))
    }

    /// Reject bounds that would make a component unusable.
    pub fn validate(&self) -> SdkResult<()> {
        let zero = |name: &str| Err(SdkError::Config(format!("{name} must be greater than zero")));
        if self.cache.max_entries == 0 {
            return zero("cache.max_entries");
        }
        if self.cache.max_bytes == 0 {
            return zero("cache.max_bytes");
        }
        for (name, secs) in [
            ("cache.default_ttl_secs", self.cache.default_ttl_secs),
            ("ttl.repository", self.ttl.repository),
            ("ttl.session", self.ttl.session),
            ("ttl.user", self.ttl.user),
            ("ttl.context", self.ttl.context),
            ("scheduler.sweep_interval_secs", self.scheduler.sweep_interval_secs),
            ("scheduler.memory_interval_secs", self.scheduler.memory_interval_secs),
            ("scheduler.health_interval_secs", self.scheduler.health_interval_secs),
        ] {
            if secs == 0 {
                return zero(name);
            }
            if secs > MAX_TTL.as_secs() {
                return Err(SdkError::Config(format!(
                    "{name} must be at most {} seconds",
                    MAX_TTL.as_secs()
                )));
            }
        }
        if self.memory.budget_bytes == 0 {
            return zero("memory.budget_bytes");
        }
        if !self.pressure_thresholds().is_valid() {
            return Err(SdkError::Config(
                "memory thresholds must satisfy 0 < medium < high < critical <= 1".into(),
            ));
        }
        if self.scheduler.history_limit == 0 {
            return zero("scheduler.history_limit");
        }
        if self.navigation_history_limit == 0 {
            return zero("navigation_history_limit");
        }
        if self.health.degraded_latency_ms > self.health.unhealthy_latency_ms
            || self.health.degraded_errors > self.health.unhealthy_errors
        {
            return Err(SdkError::Config(
                "health degraded limits must not exceed unhealthy limits".into(),
            ));
        }
        Ok(())
    }

    pub fn content_cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_entries: self.cache.max_entries,
            max_bytes: self.cache.max_bytes,
            default_ttl: Duration::from_secs(self.cache.default_ttl_secs),
        }
    }

    pub fn category_ttls(&self) -> CategoryTtls {
        CategoryTtls {
            repository: Duration::from_secs(self.ttl.repository),
            session: Duration::from_secs(self.ttl.session),
            user: Duration::from_secs(self.ttl.user),
            context: Duration::from_secs(self.ttl.context),
        }
    }

    pub fn pressure_thresholds(&self) -> MemoryPressureThresholds {
        MemoryPressureThresholds {
            medium: self.memory.medium,
            high: self.memory.high,
            critical: self.memory.critical,
        }
    }

    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            ttl: self.category_ttls(),
            memory_budget: self.memory.budget_bytes,
            pressure: self.pressure_thresholds(),
            health: HealthThresholds {
                degraded_latency: Duration::from_millis(self.health.degraded_latency_ms),
                unhealthy_latency: Duration::from_millis(self.health.unhealthy_latency_ms),
                degraded_errors: self.health.degraded_errors,
                unhealthy_errors: self.health.unhealthy_errors,
                error_window: Duration::from_secs(self.health.error_window_secs),
            },
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            sweep_interval: Duration::from_secs(self.scheduler.sweep_interval_secs),
            memory_interval: Duration::from_secs(self.scheduler.memory_interval_secs),
            health_interval: Duration::from_secs(self.scheduler.health_interval_secs),
            shutdown_timeout: Duration::from_secs(self.scheduler.shutdown_timeout_secs),
            history_limit: self.scheduler.history_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let config = VrepoConfig::from_toml_str("").unwrap();
        assert_eq!(config.cache.max_entries, 1000);
        assert_eq!(config.ttl.user, 86400);
        assert_eq!(config.scheduler.health_interval_secs, 60);
        assert_eq!(config.navigation_history_limit, 1000);
        assert!(config.materialize_root.is_none());
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = VrepoConfig::from_toml_str(
            r#"
            materialize_root = "/var/tmp/vrepo"

            [cache]
            max_entries = 10

            [ttl]
            session = 60

            [memory]
            budget_bytes = 1048576
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.max_entries, 10);
        assert_eq!(config.cache.max_bytes, 64 * 1024 * 1024);
        assert_eq!(config.ttl.session, 60);
        assert_eq!(config.ttl.context, 900);
        assert_eq!(config.materialize_root.as_deref(), Some(Path::new("/var/tmp/vrepo")));

        let lifecycle = config.lifecycle_config();
        assert_eq!(lifecycle.memory_budget, 1_048_576);
        assert_eq!(lifecycle.ttl.session, Duration::from_secs(60));
    }

    #[test]
    fn zero_bounds_rejected() {
        let err = VrepoConfig::from_toml_str("[cache]\nmax_bytes = 0").unwrap_err();
        assert!(err.to_string().contains("cache.max_bytes"));
        let err = VrepoConfig::from_toml_str("[ttl]\ncontext = 0").unwrap_err();
        assert!(err.to_string().contains("ttl.context"));
        assert!(VrepoConfig::from_toml_str("navigation_history_limit = 0").is_err());
    }

    #[test]
    fn oversized_ttls_rejected() {
        let err = VrepoConfig::from_toml_str("[cache]\ndefault_ttl_secs = 9223372036854775807")
            .unwrap_err();
        assert!(err.to_string().contains("cache.default_ttl_secs"));
        let err = VrepoConfig::from_toml_str(&format!("[ttl]\nuser = {}", MAX_TTL.as_secs() + 1))
            .unwrap_err();
        assert!(err.to_string().contains("ttl.user"));
        let config =
            VrepoConfig::from_toml_str(&format!("[ttl]\nuser = {}", MAX_TTL.as_secs())).unwrap();
        assert_eq!(config.category_ttls().user, MAX_TTL);
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let err = VrepoConfig::from_toml_str("[memory]\nmedium = 0.9\nhigh = 0.8").unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }

    #[test]
    fn malformed_toml_is_config_error() {
        assert!(matches!(
            VrepoConfig::from_toml_str("[cache\nmax_entries = 1"),
            Err(SdkError::Config(_))
        ));
        assert!(matches!(
            VrepoConfig::from_toml_str("[cache]\nmax_entries = \"many\""),
            Err(SdkError::Config(_))
        ));
    }

    #[test]
    fn toml_output_reloads() {
        let mut config = VrepoConfig::default();
        config.scheduler.sweep_interval_secs = 42;
        let text = config.to_toml_string().unwrap();
        assert_eq!(VrepoConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vrepo.toml");
        std::fs::write(&path, "[scheduler]\nhistory_limit = 7\n").unwrap();
        assert_eq!(VrepoConfig::load(&path).unwrap().scheduler.history_limit, 7);
        assert!(VrepoConfig::load(dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn derived_component_configs() {
        let config = VrepoConfig::default();
        assert_eq!(config.content_cache_config(), CacheConfig::default());
        assert_eq!(config.scheduler_config(), SchedulerConfig::default());
        assert_eq!(config.lifecycle_config(), LifecycleConfig::default());
    }
}
