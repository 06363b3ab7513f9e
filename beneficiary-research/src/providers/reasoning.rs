use std::sync::Arc;

use async_trait::async_trait;
use beneficiary_core::{BeneficiaryError, ProviderResult, ResearchRequest};
use tracing::{debug, instrument};

use super::{findings_from_record, ResearchContext, ResearchProvider};
use crate::client::LlmClient;
use crate::parser::StructuredResponseParser;
use crate::prompts::reasoning_prompt;

/// Answers from model knowledge alone, no external research
pub struct ReasoningProvider {
    llm: Arc<dyn LlmClient>,
    parser: StructuredResponseParser,
    name: String,
}

impl ReasoningProvider {
    pub const NAME: &'static str = "reasoning";

    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            parser: StructuredResponseParser::new(),
            name: Self::NAME.to_string(),
        }
    }

    /// Same provider under another name, e.g. for the direct reasoning stage
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl ResearchProvider for ReasoningProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, request, context), fields(brand = %request.brand))]
    async fn research(
        &self,
        request: &ResearchRequest,
        context: &ResearchContext,
    ) -> Result<ProviderResult, BeneficiaryError> {
        let raw = self.llm.invoke(&reasoning_prompt(request, context)).await?;
        let record = self.parser.parse(&raw);
        debug!(
            strategy = ?record.parse_strategy,
            beneficiary = %record.financial_beneficiary,
            "Reasoning response parsed"
        );
        Ok(findings_from_record(&self.name, request, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_support::ScriptedLlm;

    #[tokio::test]
    async fn test_reasoning_success() {
        let llm = Arc::new(ScriptedLlm::replying(vec![Ok(
            r#"{"financial_beneficiary": "Globex Corp", "confidence_score": 74}"#.to_string(),
        )]));
        let provider = ReasoningProvider::new(llm.clone());

        let result = provider
            .research(&ResearchRequest::new("Acme"), &ResearchContext::default())
            .await
            .unwrap();

        assert!(result.is_accepted());
        assert_eq!(result.findings().unwrap().provider, "reasoning");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_upstream_error_propagates() {
        let llm = Arc::new(ScriptedLlm::replying(vec![Err(BeneficiaryError::rate_limited(
            "slow down",
        ))]));
        let provider = ReasoningProvider::new(llm).named("direct_reasoning");
        assert_eq!(provider.name(), "direct_reasoning");

        let err = provider
            .research(&ResearchRequest::new("Acme"), &ResearchContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BeneficiaryError::RateLimited(_)));
    }
}
