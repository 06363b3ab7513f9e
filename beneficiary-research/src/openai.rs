use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use beneficiary_core::BeneficiaryError;
use tracing::{debug, instrument};

use crate::client::{LlmClient, LlmPrompt};

pub const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIClient {
    /// Client configured from `OPENAI_API_KEY`
    pub fn new() -> Result<Self, BeneficiaryError> {
        if std::env::var("OPENAI_API_KEY").map_or(true, |k| k.trim().is_empty()) {
            return Err(BeneficiaryError::config("OPENAI_API_KEY is not set"));
        }
        // async-openai reads OPENAI_API_KEY from env
        Ok(Self::with_config(OpenAIConfig::default()))
    }

    pub fn with_api_key(api_key: &str) -> Self {
        Self::with_config(OpenAIConfig::new().with_api_key(api_key))
    }

    fn with_config(config: OpenAIConfig) -> Self {
        Self {
            client: Client::with_config(config),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            max_tokens: 1500,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    #[instrument(skip(self, prompt), fields(model = %self.model))]
    async fn invoke(&self, prompt: &LlmPrompt) -> Result<String, BeneficiaryError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(prompt.system.as_str())
                    .build()
                    .map_err(|e| BeneficiaryError::internal(e.to_string()))?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt.user.as_str())
                    .build()
                    .map_err(|e| BeneficiaryError::internal(e.to_string()))?
                    .into(),
            ])
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| BeneficiaryError::internal(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| classify_api_error(&e.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| BeneficiaryError::parse("No response from OpenAI"))?;

        debug!(chars = content.len(), "OpenAI response received");
        Ok(content.clone())
    }
}

/// Map an OpenAI error message onto the transient/permanent error kinds
fn classify_api_error(message: &str) -> BeneficiaryError {
    let lower = message.to_lowercase();
    if lower.contains("rate limit") || lower.contains("429") || lower.contains("quota") {
        BeneficiaryError::rate_limited(format!("OpenAI API error: {}", message))
    } else if lower.contains("api key") || lower.contains("401") || lower.contains("unauthorized")
    {
        BeneficiaryError::auth(format!("OpenAI API error: {}", message))
    } else if lower.contains("timed out") || lower.contains("timeout") {
        BeneficiaryError::Timeout { timeout_ms: 0 }
    } else if lower.contains("connection") || lower.contains("error sending request") {
        BeneficiaryError::network(format!("OpenAI API error: {}", message))
    } else {
        BeneficiaryError::api(format!("OpenAI API error: {}", message))
    }
}
