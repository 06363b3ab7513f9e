use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use beneficiary_core::{normalize_url, BeneficiaryError, ProviderResult, ResearchRequest};
use tracing::{info, instrument, warn};

use super::{findings_from_record, ResearchContext, ResearchProvider};
use crate::client::{LlmClient, SearchClient, SearchHit};
use crate::parser::StructuredResponseParser;
use crate::prompts::{search_queries, synthesis_prompt};

#[derive(Debug, Clone)]
pub struct WebSearchConfig {
    /// Search rounds before giving up; each round widens the queries
    pub max_rounds: usize,
    pub results_per_query: u32,
    /// Cap on hits handed to the model per synthesis
    pub max_hits: usize,
    /// A round's answer at or above this confidence ends the search early
    pub early_stop_confidence: u8,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            max_rounds: 2,
            results_per_query: 5,
            max_hits: 12,
            early_stop_confidence: 70,
        }
    }
}

/// Multi-round web search followed by model synthesis
pub struct WebSearchProvider {
    search: Arc<dyn SearchClient>,
    llm: Arc<dyn LlmClient>,
    parser: StructuredResponseParser,
    config: WebSearchConfig,
}

impl WebSearchProvider {
    pub const NAME: &'static str = "web_search";

    pub fn new(search: Arc<dyn SearchClient>, llm: Arc<dyn LlmClient>) -> Self {
        Self::with_config(search, llm, WebSearchConfig::default())
    }

    pub fn with_config(
        search: Arc<dyn SearchClient>,
        llm: Arc<dyn LlmClient>,
        config: WebSearchConfig,
    ) -> Self {
        Self {
            search,
            llm,
            parser: StructuredResponseParser::new(),
            config,
        }
    }

    /// Run one round of queries, appending unseen hits
    ///
    /// Returns the last error if every query in the round failed.
    async fn search_round(
        &self,
        request: &ResearchRequest,
        round: usize,
        seen: &mut HashSet<String>,
        hits: &mut Vec<SearchHit>,
    ) -> Result<usize, BeneficiaryError> {
        let queries = search_queries(request, round);
        let mut added = 0;
        let mut last_error = None;
        let mut any_ok = false;

        for query in &queries {
            match self.search.search(query, self.config.results_per_query).await {
                Ok(results) => {
                    any_ok = true;
                    for hit in results {
                        if hits.len() >= self.config.max_hits {
                            break;
                        }
                        if seen.insert(normalize_url(&hit.url)) {
                            hits.push(hit);
                            added += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!("Search query '{}' failed: {}", query, e);
                    last_error = Some(e);
                }
            }
        }

        match (any_ok, last_error) {
            (false, Some(e)) => Err(e),
            _ => Ok(added),
        }
    }
}

#[async_trait]
impl ResearchProvider for WebSearchProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    #[instrument(skip(self, request, context), fields(brand = %request.brand))]
    async fn research(
        &self,
        request: &ResearchRequest,
        context: &ResearchContext,
    ) -> Result<ProviderResult, BeneficiaryError> {
        let mut seen = HashSet::new();
        let mut hits = Vec::new();
        let mut best: Option<ProviderResult> = None;

        for round in 0..self.config.max_rounds.max(1) {
            let added = match self.search_round(request, round, &mut seen, &mut hits).await {
                Ok(added) => added,
                // Only fatal when nothing was gathered at all, so the caller can retry
                Err(e) if hits.is_empty() => return Err(e),
                Err(_) => 0,
            };
            info!(round, added, total = hits.len(), "Search round complete");

            if added == 0 {
                continue;
            }

            let raw = self
                .llm
                .invoke(&synthesis_prompt(request, context, &hits))
                .await?;
            let result = findings_from_record(Self::NAME, request, self.parser.parse(&raw));

            let confident = result
                .findings()
                .is_some_and(|f| f.confidence_score() >= self.config.early_stop_confidence);
            if result.is_accepted() && confident {
                return Ok(result);
            }
            if result.is_accepted() || best.is_none() {
                best = Some(result);
            }
        }

        Ok(best.unwrap_or_else(|| ProviderResult::miss("no search results")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_support::{hit, FixedSearch, ScriptedLlm};

    fn search_with(hits: Vec<(&str, Vec<SearchHit>)>) -> Arc<FixedSearch> {
        Arc::new(FixedSearch {
            hits: hits.into_iter().map(|(q, h)| (q.to_string(), h)).collect(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_confident_first_round_stops_early() {
        let search = search_with(vec![(
            "parent company",
            vec![hit("https://globex.com/acme", "Globex owns Acme")],
        )]);
        let llm = Arc::new(ScriptedLlm::replying(vec![Ok(
            r#"{"financial_beneficiary": "Globex Corp", "confidence_score": 85, "sources": ["https://globex.com/acme"]}"#
                .to_string(),
        )]));
        let provider = WebSearchProvider::new(search.clone(), llm.clone());

        let result = provider
            .research(&ResearchRequest::new("Acme"), &ResearchContext::default())
            .await
            .unwrap();

        assert!(result.is_accepted());
        assert_eq!(llm.calls(), 1);
        assert_eq!(search.queries.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_low_confidence_widens_search() {
        let search = search_with(vec![
            ("parent company", vec![hit("https://blog.example/acme", "maybe Globex?")]),
            ("acquired by", vec![hit("https://sec.gov/acme", "Globex acquired Acme")]),
        ]);
        let llm = Arc::new(ScriptedLlm::replying(vec![
            Ok(r#"{"financial_beneficiary": "Globex Corp", "confidence_score": 40}"#.to_string()),
            Ok(r#"{"financial_beneficiary": "Globex Corp", "confidence_score": 90}"#.to_string()),
        ]));
        let provider = WebSearchProvider::new(search, llm.clone());

        let result = provider
            .research(&ResearchRequest::new("Acme"), &ResearchContext::default())
            .await
            .unwrap();

        assert_eq!(llm.calls(), 2);
        assert_eq!(result.findings().unwrap().confidence_score(), 90);
        let last_prompt = llm.prompts.lock().unwrap().last().cloned().unwrap();
        assert!(last_prompt.user.contains("https://blog.example/acme"));
        assert!(last_prompt.user.contains("https://sec.gov/acme"));
    }

    #[tokio::test]
    async fn test_no_hits_is_a_miss() {
        let provider = WebSearchProvider::new(
            search_with(vec![]),
            Arc::new(ScriptedLlm::default()),
        );
        let result = provider
            .research(&ResearchRequest::new("Zorblex"), &ResearchContext::default())
            .await
            .unwrap();
        assert_eq!(result, ProviderResult::miss("no search results"));
    }
}
