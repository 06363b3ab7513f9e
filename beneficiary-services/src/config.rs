//! Pipeline tuning and environment configuration

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::conflict::DEFAULT_TIE_RATIO;
use crate::executor::RetryPolicy;
use crate::stores::CacheTtlPolicy;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Knowledge-base match must be strictly above this similarity (0-1)
    pub kb_min_similarity: f64,
    /// ...and the stored answer strictly above this confidence
    pub kb_min_confidence: u8,
    /// Direct reasoning is accepted strictly above this confidence
    pub direct_reasoning_threshold: u8,
    pub static_mapping_confidence: u8,
    pub fallback_confidence: u8,
    /// Minimum confidence for a result to be cached
    pub cache_write_floor: u8,
    /// Minimum confidence for a result to be added to the knowledge base
    pub knowledge_write_floor: u8,
    pub tie_ratio: f64,
    /// Warnings at or above this count force the beneficiary to Unknown
    pub max_warnings: usize,
    /// How many knowledge matches to hand providers as context
    pub related_knowledge_limit: usize,
    pub provider_policy: RetryPolicy,
    pub cache_ttl: CacheTtlPolicy,
    pub knowledge_db_path: Option<String>,
    pub static_mappings_path: Option<String>,
    pub source_domains_path: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            kb_min_similarity: 0.8,
            kb_min_confidence: 80,
            direct_reasoning_threshold: 70,
            static_mapping_confidence: 95,
            fallback_confidence: 20,
            cache_write_floor: 50,
            knowledge_write_floor: 70,
            tie_ratio: DEFAULT_TIE_RATIO,
            max_warnings: 3,
            related_knowledge_limit: 3,
            provider_policy: RetryPolicy::default(),
            cache_ttl: CacheTtlPolicy::default(),
            knowledge_db_path: None,
            static_mappings_path: None,
            source_domains_path: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by whatever environment variables are set
    ///
    /// Reads `PROVIDER_TIMEOUT_MS`, `PROVIDER_MAX_RETRIES`, `CACHE_TTL_HOURS`,
    /// `KNOWLEDGE_DB_PATH`, `STATIC_MAPPINGS_PATH` and `SOURCE_DOMAINS_PATH`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = env_parse::<u64>("PROVIDER_TIMEOUT_MS") {
            config.provider_policy = config
                .provider_policy
                .with_timeout(Duration::from_millis(ms));
        }
        if let Some(retries) = env_parse::<u32>("PROVIDER_MAX_RETRIES") {
            config.provider_policy = config.provider_policy.with_max_retries(retries);
        }
        if let Some(hours) = env_parse::<u64>("CACHE_TTL_HOURS") {
            config.cache_ttl = CacheTtlPolicy::from_hours(hours);
        }

        config.knowledge_db_path = env_string("KNOWLEDGE_DB_PATH");
        config.static_mappings_path = env_string("STATIC_MAPPINGS_PATH");
        config.source_domains_path = env_string("SOURCE_DOMAINS_PATH");
        config
    }

    pub fn with_tie_ratio(mut self, tie_ratio: f64) -> Self {
        self.tie_ratio = tie_ratio;
        self
    }

    pub fn with_max_warnings(mut self, max_warnings: usize) -> Self {
        self.max_warnings = max_warnings;
        self
    }

    pub fn with_provider_policy(mut self, policy: RetryPolicy) -> Self {
        self.provider_policy = policy;
        self
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.static_mapping_confidence, 95);
        assert_eq!(config.fallback_confidence, 20);
        assert_eq!(config.cache_write_floor, 50);
        assert_eq!(config.tie_ratio, 0.8);
        assert_eq!(config.max_warnings, 3);
        assert_eq!(config.provider_policy.max_retries, 2);
    }

    #[test]
    fn test_builders() {
        let config = PipelineConfig::default()
            .with_tie_ratio(0.9)
            .with_max_warnings(5)
            .with_provider_policy(RetryPolicy::default().with_max_retries(0));
        assert_eq!(config.tie_ratio, 0.9);
        assert_eq!(config.max_warnings, 5);
        assert_eq!(config.provider_policy.max_attempts(), 1);
    }
}
