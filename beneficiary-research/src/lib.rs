//! Research side of brand ownership resolution
//!
//! Upstream clients (OpenAI chat completions, Exa search, plain page
//! fetching), the structured response parser that turns model output into
//! ownership records, and the research providers built on top of them.

pub mod client;
pub mod exa;
pub mod fetcher;
pub mod openai;
pub mod parser;
pub mod prompts;
pub mod providers;
pub mod rate_limiter;

pub use client::{LlmClient, LlmPrompt, PageFetcher, SearchClient, SearchHit};
pub use exa::{ExaClient, ExaSearchRequest, ExaSearchResponse, ExaSearchResult};
pub use fetcher::HttpPageFetcher;
pub use openai::OpenAIClient;
pub use parser::{
    parse_ownership_response, FlowEntry, OwnershipRecord, ParseFailure, ParseStrategy,
    StructuredResponseParser,
};
pub use providers::{
    findings_from_record, LegacyScrapeProvider, ReasoningProvider, ResearchContext,
    ResearchProvider, WebSearchConfig, WebSearchProvider,
};
pub use rate_limiter::{RateLimiter, RateLimiterStats};
