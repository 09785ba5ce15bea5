//! OpenAI-backed provider, which also serves OpenAI-compatible custom
//! endpoints by varying only the base URL.

use async_openai::{
    Client as OpenAIClient,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest,
    },
};
use async_trait::async_trait;
use tracing::debug;

use super::Provider;
use crate::{
    config::{AIProviderConfig, OPENAI_API_BASE},
    error::{GraderError, Result},
};

/// Client for OpenAI chat completions and compatible services.
#[derive(Debug)]
pub struct OpenAiProvider {
    /// Underlying SDK client, preconfigured with base URL and key.
    client: OpenAIClient<OpenAIConfig>,
    /// Model identifier for every request.
    model: String,
    /// Sampling temperature.
    temperature: f32,
    /// Response token budget.
    max_tokens: u32,
}

impl OpenAiProvider {
    /// Builds the client from resolved configuration. No network call.
    pub fn new(config: &AIProviderConfig, api_key: &str) -> Self {
        let base_url = config.base_url.as_deref().unwrap_or(OPENAI_API_BASE);
        let client = OpenAIClient::with_config(
            OpenAIConfig::new()
                .with_api_base(base_url)
                .with_api_key(api_key),
        );

        Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn grade(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        if user_prompt.trim().is_empty() {
            return Err(GraderError::Validation("user prompt is empty".to_string()));
        }

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()
                .map_err(map_openai_error)?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_prompt)
                .build()
                .map_err(map_openai_error)?
                .into(),
        ];

        debug!(model = %self.model, "sending grading request to openai");

        let response = self
            .client
            .chat()
            .create(CreateChatCompletionRequest {
                model: self.model.clone(),
                messages,
                temperature: Some(self.temperature),
                max_completion_tokens: Some(self.max_tokens),
                n: Some(1),
                stream: Some(false),
                ..Default::default()
            })
            .await
            .map_err(map_openai_error)?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| GraderError::ProviderResponse("empty response content".to_string()))
    }
}

/// Maps SDK failures onto the uniform taxonomy: transport errors are
/// retryable connection failures, API rejections are not.
fn map_openai_error(err: OpenAIError) -> GraderError {
    match err {
        OpenAIError::Reqwest(e) => GraderError::ProviderConnection(e.to_string()),
        OpenAIError::ApiError(e) => GraderError::ProviderResponse(e.message),
        other => GraderError::ProviderResponse(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::ProviderKind;

    fn config(base_url: Option<&str>) -> AIProviderConfig {
        AIProviderConfig {
            provider: ProviderKind::OpenAi,
            model: "gpt-4".to_string(),
            api_key: Some("sk-test".to_string()),
            base_url: base_url.map(str::to_string),
            temperature: 0.0,
            max_tokens: 4096,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn constructs_against_the_default_endpoint() {
        let provider = OpenAiProvider::new(&config(None), "sk-test");
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model, "gpt-4");
    }

    #[test]
    fn custom_endpoint_only_varies_the_base_url() {
        let provider = OpenAiProvider::new(&config(Some("http://localhost:8000/v1")), "sk-test");
        assert_eq!(provider.model, "gpt-4");
        assert_eq!(provider.temperature, 0.0);
    }
}
