use async_trait::async_trait;
use beneficiary_core::ResolutionResult;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use super::{
    match_score, CacheTtlPolicy, KnowledgeEntry, KnowledgeMatch, KnowledgeStore, StoreError,
    MIN_CANDIDATE_SIMILARITY,
};

#[derive(Debug, Clone)]
struct CachedResult {
    result: ResolutionResult,
    expires_at: DateTime<Utc>,
}

impl CachedResult {
    fn is_fresh(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// Process-local cache and knowledge base
///
/// Concurrent reads and idempotent upserts are handled by the maps; entries
/// are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeStore {
    cache: DashMap<String, CachedResult>,
    knowledge: DashMap<String, KnowledgeEntry>,
    ttl: CacheTtlPolicy,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: CacheTtlPolicy) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    pub fn knowledge_len(&self) -> usize {
        self.knowledge.len()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn lookup(&self, key: &str) -> Result<Option<ResolutionResult>, StoreError> {
        let hit = self.cache.get(key).map(|entry| entry.value().clone());
        match hit {
            Some(cached) if cached.is_fresh() => Ok(Some(cached.result)),
            Some(_) => {
                debug!(key, "Cache entry expired");
                self.cache.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn upsert(&self, key: &str, result: &ResolutionResult) -> Result<(), StoreError> {
        let expires_at = self.ttl.expires_at(Utc::now(), result.confidence_score);
        self.cache.insert(
            key.to_string(),
            CachedResult {
                result: result.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn search_similar(
        &self,
        brand: &str,
        product_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<KnowledgeMatch>, StoreError> {
        let mut matches: Vec<KnowledgeMatch> = self
            .knowledge
            .iter()
            .map(|entry| KnowledgeMatch {
                similarity: match_score(brand, product_name, entry.value()),
                entry: entry.value().clone(),
            })
            .filter(|m| m.similarity >= MIN_CANDIDATE_SIMILARITY)
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(b.entry.confidence_score.cmp(&a.entry.confidence_score))
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn upsert_knowledge(&self, entry: KnowledgeEntry) -> Result<(), StoreError> {
        self.knowledge.insert(entry.key(), entry);
        Ok(())
    }
}
