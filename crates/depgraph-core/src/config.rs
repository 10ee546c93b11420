use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::DepGraphError;

/// Deployment profile selecting the environment-specific default layer
/// (spec §6: "built-in defaults → environment-specific defaults → ...").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Staging,
    Production,
}

impl Environment {
    fn from_env_var(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" => Environment::Staging,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    pub l1_max_entries: usize,
    pub l1_ttl_ms: u64,
    pub l2_ttl_ms: u64,
    pub l2_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexingConfig {
    pub batch_size: usize,
    pub max_concurrent_builds: usize,
    pub build_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceConfig {
    pub lookup_timeout_ms: u64,
    pub reverse_lookup_timeout_ms: u64,
    pub max_batch_lookup_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionConfig {
    pub enabled_types: Vec<String>,
    pub max_references_per_node: usize,
    pub confidence_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RollupLimitsConfig {
    pub max_repositories_per_rollup: usize,
    pub max_matchers_per_rollup: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub cache: CacheConfig,
    pub indexing: IndexingConfig,
    pub performance: PerformanceConfig,
    pub extraction: ExtractionConfig,
    pub rollup: RollupLimitsConfig,
    pub parallel_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig {
                l1_max_entries: 10_000,
                l1_ttl_ms: 300_000,
                l2_ttl_ms: 3_600_000,
                l2_prefix: "ext-idx:".to_string(),
            },
            indexing: IndexingConfig {
                batch_size: 1000,
                max_concurrent_builds: 3,
                build_timeout_ms: 300_000,
            },
            performance: PerformanceConfig {
                lookup_timeout_ms: 100,
                reverse_lookup_timeout_ms: 500,
                max_batch_lookup_size: 100,
            },
            extraction: ExtractionConfig {
                enabled_types: vec![
                    "arn".into(),
                    "resource_id".into(),
                    "k8s_reference".into(),
                    "container_image".into(),
                    "helm_chart".into(),
                    "git_url".into(),
                    "gcp_resource".into(),
                    "azure_resource".into(),
                ],
                max_references_per_node: 100,
                confidence_threshold: 0.5,
            },
            rollup: RollupLimitsConfig {
                max_repositories_per_rollup: 50,
                max_matchers_per_rollup: 20,
            },
            parallel_workers: 4,
        }
    }
}

impl Config {
    /// Apply the environment-specific default layer on top of built-in
    /// defaults. Only staging/production tighten anything here; development
    /// and test keep the built-in defaults.
    fn for_environment(env: Environment) -> Self {
        let mut config = Config::default();
        match env {
            Environment::Production => {
                config.indexing.max_concurrent_builds = 5;
                config.cache.l1_max_entries = 50_000;
            }
            Environment::Staging => {
                config.indexing.max_concurrent_builds = 4;
            }
            Environment::Test => {
                config.cache.l1_max_entries = 100;
                config.indexing.batch_size = 100;
            }
            Environment::Development => {}
        }
        config
    }

    /// Layer built-in defaults, then environment-specific defaults, then
    /// environment variables, then programmatic overrides (spec §6).
    pub fn load(env_vars: &HashMap<String, String>, overrides: Option<Config>) -> Result<Config, DepGraphError> {
        let environment = env_vars
            .get("DEPGRAPH_ENV")
            .map(|v| Environment::from_env_var(v))
            .unwrap_or(Environment::Development);

        let mut config = Config::for_environment(environment);
        apply_env_vars(&mut config, env_vars)?;

        if let Some(overrides) = overrides {
            config = overrides;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DepGraphError> {
        validate_range("cache.l1.maxEntries", self.cache.l1_max_entries, 100, 100_000)?;
        validate_range("cache.l1.ttlMs", self.cache.l1_ttl_ms as usize, 1_000, 3_600_000)?;
        validate_range("cache.l2.ttlMs", self.cache.l2_ttl_ms as usize, 60_000, 86_400_000)?;
        validate_range("indexing.batchSize", self.indexing.batch_size, 100, 5000)?;
        validate_range("indexing.maxConcurrentBuilds", self.indexing.max_concurrent_builds, 1, 10)?;
        validate_range("performance.lookupTimeoutMs", self.performance.lookup_timeout_ms as usize, 10, 1000)?;
        validate_range(
            "performance.reverseLookupTimeoutMs",
            self.performance.reverse_lookup_timeout_ms as usize,
            100,
            5000,
        )?;
        validate_range(
            "performance.maxBatchLookupSize",
            self.performance.max_batch_lookup_size,
            10,
            1000,
        )?;
        validate_range(
            "extraction.maxReferencesPerNode",
            self.extraction.max_references_per_node,
            10,
            500,
        )?;
        if !(0.0..=1.0).contains(&self.extraction.confidence_threshold) {
            return Err(invalid("extraction.confidenceThreshold", "must be in [0, 1]"));
        }
        Ok(())
    }
}

fn validate_range(name: &'static str, value: usize, min: usize, max: usize) -> Result<(), DepGraphError> {
    if value < min || value > max {
        return Err(invalid(name, "out of range"));
    }
    Ok(())
}

fn invalid(field: &'static str, reason: &'static str) -> DepGraphError {
    DepGraphError::InvalidConfig { field, detail: reason }
}

fn apply_env_vars(config: &mut Config, env_vars: &HashMap<String, String>) -> Result<(), DepGraphError> {
    macro_rules! apply_usize {
        ($key:expr, $target:expr) => {
            if let Some(raw) = env_vars.get($key) {
                $target = raw
                    .parse()
                    .map_err(|_| DepGraphError::Serialization { detail: format!("invalid value for {}", $key) })?;
            }
        };
    }
    macro_rules! apply_u64 {
        ($key:expr, $target:expr) => {
            if let Some(raw) = env_vars.get($key) {
                $target = raw
                    .parse()
                    .map_err(|_| DepGraphError::Serialization { detail: format!("invalid value for {}", $key) })?;
            }
        };
    }

    apply_usize!("ROLLUP_CACHE_L1_MAX_ENTRIES", config.cache.l1_max_entries);
    apply_u64!("ROLLUP_CACHE_L1_TTL_MS", config.cache.l1_ttl_ms);
    apply_u64!("ROLLUP_CACHE_L2_TTL_MS", config.cache.l2_ttl_ms);
    if let Some(prefix) = env_vars.get("ROLLUP_CACHE_L2_PREFIX") {
        config.cache.l2_prefix = prefix.clone();
    }
    apply_usize!("EXTERNAL_INDEX_BATCH_SIZE", config.indexing.batch_size);
    apply_usize!("EXTERNAL_INDEX_MAX_CONCURRENT_BUILDS", config.indexing.max_concurrent_builds);
    apply_u64!("EXTERNAL_INDEX_BUILD_TIMEOUT_MS", config.indexing.build_timeout_ms);
    apply_u64!("ROLLUP_PERFORMANCE_LOOKUP_TIMEOUT_MS", config.performance.lookup_timeout_ms);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_batch_size_fails_fast() {
        let mut config = Config::default();
        config.indexing.batch_size = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_var_overrides_default() {
        let mut env = HashMap::new();
        env.insert("ROLLUP_CACHE_L1_MAX_ENTRIES".to_string(), "2000".to_string());
        let config = Config::load(&env, None).unwrap();
        assert_eq!(config.cache.l1_max_entries, 2000);
    }

    #[test]
    fn programmatic_override_wins_over_everything() {
        let mut env = HashMap::new();
        env.insert("ROLLUP_CACHE_L1_MAX_ENTRIES".to_string(), "2000".to_string());
        let mut overrides = Config::default();
        overrides.cache.l1_max_entries = 5000;
        let config = Config::load(&env, Some(overrides)).unwrap();
        assert_eq!(config.cache.l1_max_entries, 5000);
    }

    #[test]
    fn production_profile_raises_concurrency_default() {
        let mut env = HashMap::new();
        env.insert("DEPGRAPH_ENV".to_string(), "production".to_string());
        let config = Config::load(&env, None).unwrap();
        assert_eq!(config.indexing.max_concurrent_builds, 5);
    }
}
