use std::sync::Arc;

use async_trait::async_trait;
use beneficiary_core::{normalize_url, BeneficiaryError, ProviderResult, ResearchRequest};
use tracing::{info, instrument, warn};

use super::{findings_from_record, ResearchContext, ResearchProvider};
use crate::client::{LlmClient, PageFetcher, SearchClient};
use crate::fetcher::{extract_urls_from_text, fetch_pages};
use crate::parser::StructuredResponseParser;
use crate::prompts::extraction_prompt;

/// Hint keys whose values are treated as candidate pages
const URL_HINT_KEYS: [&str; 4] = ["website", "url", "homepage", "source"];

const MAX_CANDIDATES: usize = 5;

/// Scrapes candidate pages and has the model extract the ownership chain
pub struct LegacyScrapeProvider {
    fetcher: Arc<dyn PageFetcher>,
    llm: Arc<dyn LlmClient>,
    search: Option<Arc<dyn SearchClient>>,
    parser: StructuredResponseParser,
}

impl LegacyScrapeProvider {
    pub const NAME: &'static str = "legacy_scrape";

    pub fn new(fetcher: Arc<dyn PageFetcher>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            fetcher,
            llm,
            search: None,
            parser: StructuredResponseParser::new(),
        }
    }

    /// Also pull candidate pages from one search query
    pub fn with_search(mut self, search: Arc<dyn SearchClient>) -> Self {
        self.search = Some(search);
        self
    }

    /// Pages worth scraping: hinted URLs, URLs in the follow-up, search
    /// results, then the brand's encyclopedia article
    async fn candidate_urls(&self, request: &ResearchRequest) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();

        for key in URL_HINT_KEYS {
            if let Some(value) = request.hints.get(key) {
                urls.extend(extract_urls_from_text(value));
            }
        }
        if let Some(follow_up) = request.follow_up_context.as_deref() {
            urls.extend(extract_urls_from_text(follow_up));
        }

        if let Some(search) = &self.search {
            let query = format!("{} company ownership", request.brand.trim());
            match search.search(&query, 3).await {
                Ok(hits) => urls.extend(hits.into_iter().map(|h| h.url)),
                Err(e) => warn!("Candidate search failed: {}", e),
            }
        }

        urls.push(wiki_url(&request.brand));

        let mut seen = std::collections::HashSet::new();
        urls.retain(|u| seen.insert(normalize_url(u)));
        urls.truncate(MAX_CANDIDATES);
        urls
    }
}

fn wiki_url(brand: &str) -> String {
    let title = brand.split_whitespace().collect::<Vec<_>>().join("_");
    format!("https://en.wikipedia.org/wiki/{}", title)
}

#[async_trait]
impl ResearchProvider for LegacyScrapeProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    #[instrument(skip(self, request, context), fields(brand = %request.brand))]
    async fn research(
        &self,
        request: &ResearchRequest,
        context: &ResearchContext,
    ) -> Result<ProviderResult, BeneficiaryError> {
        let candidates = self.candidate_urls(request).await;
        let pages = fetch_pages(Arc::clone(&self.fetcher), &candidates).await;
        info!(
            candidates = candidates.len(),
            fetched = pages.len(),
            "Scrape candidates fetched"
        );

        if pages.is_empty() {
            return Ok(ProviderResult::miss("no candidate pages could be fetched"));
        }

        let raw = self
            .llm
            .invoke(&extraction_prompt(request, context, &pages))
            .await?;
        Ok(findings_from_record(Self::NAME, request, self.parser.parse(&raw)))
    }
}
