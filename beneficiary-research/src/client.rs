//! Narrow interfaces to the upstream services providers depend on
//!
//! Every call through these traits is "an async operation returning text or
//! failing"; retries and deadlines are applied by the caller.

use async_trait::async_trait;
use beneficiary_core::BeneficiaryError;
use serde::{Deserialize, Serialize};

/// A system + user prompt pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmPrompt {
    pub system: String,
    pub user: String,
}

impl LlmPrompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Chat-style language model
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn invoke(&self, prompt: &LlmPrompt) -> Result<String, BeneficiaryError>;
}

/// One web search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    /// Highlighted passages or page text, already truncated
    #[serde(default)]
    pub snippet: String,
}

/// Web search backend
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchHit>, BeneficiaryError>;
}

/// Fetches a page and returns its readable text
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, BeneficiaryError>;
}
