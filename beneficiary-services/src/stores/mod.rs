//! Cache, knowledge-base and static mapping stores
//!
//! The pipeline only sees the [`KnowledgeStore`] and [`StaticMappingStore`]
//! traits. Keys are normalized brand names, optionally suffixed with the
//! normalized product (see `ResearchRequest::cache_key`).

mod memory;
mod similarity;
mod sqlite;
mod static_mapping;

pub use memory::InMemoryKnowledgeStore;
pub use similarity::{
    bigram_similarity, candidate_length_window, match_score, MIN_CANDIDATE_SIMILARITY,
};
pub use sqlite::SqliteKnowledgeStore;
pub use static_mapping::JsonStaticMappings;

use std::time::Duration;

use async_trait::async_trait;
use beneficiary_core::{
    BeneficiaryError, OwnershipEntity, ResolutionResult, SourceRecord, UNKNOWN_BENEFICIARY,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<StoreError> for BeneficiaryError {
    fn from(err: StoreError) -> Self {
        BeneficiaryError::storage(err.to_string())
    }
}

/// A past resolution kept for similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub brand: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    pub financial_beneficiary: String,
    pub beneficiary_country: String,
    pub ownership_structure_type: String,
    pub confidence_score: u8,
    #[serde(default)]
    pub ownership_flow: Vec<OwnershipEntity>,
    #[serde(default)]
    pub sources: Vec<SourceRecord>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    pub fn from_result(result: &ResolutionResult) -> Self {
        Self {
            brand: result.brand.clone(),
            product_name: result.product_name.clone(),
            financial_beneficiary: result.financial_beneficiary.clone(),
            beneficiary_country: result.beneficiary_country.clone(),
            ownership_structure_type: result.ownership_structure_type.clone(),
            confidence_score: result.confidence_score,
            ownership_flow: result.ownership_flow.clone(),
            sources: result.sources.clone(),
            updated_at: Utc::now(),
        }
    }

    /// Store key, same shape as a request's cache key
    pub fn key(&self) -> String {
        let mut request = beneficiary_core::ResearchRequest::new(self.brand.as_str());
        request.product_name = self.product_name.clone();
        request.cache_key()
    }

    /// One-line description handed to providers as prior context
    pub fn summary(&self) -> String {
        let country = if self.beneficiary_country == UNKNOWN_BENEFICIARY {
            String::new()
        } else {
            format!(", {}", self.beneficiary_country)
        };
        format!(
            "{} -> {}{} (confidence {}, recorded {})",
            self.brand,
            self.financial_beneficiary,
            country,
            self.confidence_score,
            self.updated_at.format("%Y-%m-%d")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeMatch {
    pub entry: KnowledgeEntry,
    /// 0.0 - 1.0
    pub similarity: f64,
}

/// A pre-vetted brand -> owner record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticMapping {
    pub brand: String,
    pub financial_beneficiary: String,
    #[serde(default = "unknown")]
    pub beneficiary_country: String,
    #[serde(default = "unknown")]
    pub ownership_structure_type: String,
    #[serde(default)]
    pub ownership_flow: Vec<OwnershipEntity>,
    #[serde(default)]
    pub sources: Vec<String>,
}

fn unknown() -> String {
    UNKNOWN_BENEFICIARY.to_string()
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Cached result for a key, if present and not expired
    async fn lookup(&self, key: &str) -> Result<Option<ResolutionResult>, StoreError>;

    /// Insert or replace the cached result for a key
    async fn upsert(&self, key: &str, result: &ResolutionResult) -> Result<(), StoreError>;

    /// Best matches first, at most `limit`
    async fn search_similar(
        &self,
        brand: &str,
        product_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<KnowledgeMatch>, StoreError>;

    async fn upsert_knowledge(&self, entry: KnowledgeEntry) -> Result<(), StoreError>;
}

#[async_trait]
pub trait StaticMappingStore: Send + Sync {
    async fn lookup(&self, brand: &str) -> Result<Option<StaticMapping>, StoreError>;
}

/// Cache lifetime derived from result confidence
///
/// Confident answers live longer: >=85 gets three times the base, >=70 the
/// base, anything lower a quarter of it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheTtlPolicy {
    pub base: Duration,
}

impl Default for CacheTtlPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(24 * 3600),
        }
    }
}

impl CacheTtlPolicy {
    pub fn from_hours(hours: u64) -> Self {
        Self {
            base: Duration::from_secs(hours * 3600),
        }
    }

    pub fn ttl_for(&self, confidence_score: u8) -> Duration {
        match confidence_score {
            85..=u8::MAX => self.base * 3,
            70..=84 => self.base,
            _ => self.base / 4,
        }
    }

    pub fn expires_at(&self, from: DateTime<Utc>, confidence_score: u8) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(self.ttl_for(confidence_score))
            .unwrap_or_else(|_| chrono::Duration::hours(6));
        from + ttl
    }
}
