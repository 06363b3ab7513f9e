use async_trait::async_trait;
use beneficiary_core::BeneficiaryError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

use crate::client::{SearchClient, SearchHit};
use crate::fetcher::truncate_chars;
use crate::rate_limiter::RateLimiter;

const EXA_API_BASE: &str = "https://api.exa.ai";

/// Page text attached to each hit is capped at this many characters
const MAX_SNIPPET_CHARS: usize = 1500;

#[derive(Debug, Clone)]
pub struct ExaClient {
    client: Client,
    api_key: String,
    base_url: String,
    rate_limiter: Option<Arc<RateLimiter>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExaSearchRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_results: Option<u32>,
    #[serde(rename = "type")]
    pub search_type: String, // "auto", "neural", "fast"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_domains: Option<Vec<String>>,
    pub contents: ExaContentsOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExaContentsOptions {
    pub text: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlights: Option<ExaHighlightOptions>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExaHighlightOptions {
    pub num_sentences: u32,
    pub highlights_per_url: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExaSearchResponse {
    pub results: Vec<ExaSearchResult>,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExaSearchResult {
    pub url: String,
    pub title: Option<String>,
    #[serde(default)]
    pub id: String,
    pub published_date: Option<String>,
    pub text: Option<String>,
    pub highlights: Option<Vec<String>>,
}

impl From<ExaSearchResult> for SearchHit {
    fn from(result: ExaSearchResult) -> Self {
        let snippet = match result.highlights {
            Some(highlights) if !highlights.is_empty() => highlights.join(" ... "),
            _ => result.text.unwrap_or_default(),
        };
        SearchHit {
            url: result.url,
            title: result.title.unwrap_or_default(),
            published_date: result.published_date,
            snippet: truncate_chars(snippet.trim(), MAX_SNIPPET_CHARS),
        }
    }
}

impl ExaClient {
    /// Client configured from `EXA_API_KEY`
    pub fn new() -> Result<Self, BeneficiaryError> {
        let api_key = std::env::var("EXA_API_KEY")
            .map_err(|_| BeneficiaryError::config("EXA_API_KEY environment variable not set"))?;
        Self::with_api_key(api_key)
    }

    pub fn with_api_key(api_key: impl Into<String>) -> Result<Self, BeneficiaryError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| BeneficiaryError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: EXA_API_BASE.to_string(),
            rate_limiter: None,
        })
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    #[instrument(skip(self, request), fields(query = %request.query))]
    pub async fn search_raw(
        &self,
        request: &ExaSearchRequest,
    ) -> Result<ExaSearchResponse, BeneficiaryError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire().await;
        }

        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BeneficiaryError::timeout(60_000)
                } else {
                    BeneficiaryError::network(format!("Exa API request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BeneficiaryError::from_status(
                status.as_u16(),
                format!("Exa API error: {}", body),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| BeneficiaryError::parse(format!("Failed to parse Exa response: {}", e)))
    }
}

/// Request tuned for ownership research: highlights focused on the query
pub fn ownership_search_request(query: &str, limit: u32) -> ExaSearchRequest {
    ExaSearchRequest {
        query: query.to_string(),
        num_results: Some(limit),
        search_type: "auto".to_string(),
        include_domains: None,
        contents: ExaContentsOptions {
            text: true,
            highlights: Some(ExaHighlightOptions {
                num_sentences: 3,
                highlights_per_url: 2,
                query: Some(query.to_string()),
            }),
        },
    }
}

#[async_trait]
impl SearchClient for ExaClient {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchHit>, BeneficiaryError> {
        let response = self.search_raw(&ownership_search_request(query, limit)).await?;
        Ok(response.results.into_iter().map(SearchHit::from).collect())
    }
}
