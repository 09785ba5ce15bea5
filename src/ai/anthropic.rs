//! Anthropic-backed provider speaking the messages API over `reqwest`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Provider;
use crate::{
    config::{AIProviderConfig, ANTHROPIC_API_BASE},
    error::{GraderError, Result},
};

/// API version header required by the messages endpoint.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for the Anthropic messages API.
#[derive(Debug)]
pub struct AnthropicProvider {
    /// Credential sent as `x-api-key`.
    api_key: String,
    /// Model identifier for every request.
    model: String,
    /// Endpoint base, default `https://api.anthropic.com`.
    base_url: String,
    /// Sampling temperature.
    temperature: f32,
    /// Response token budget.
    max_tokens: u32,
    /// HTTP client carrying the configured timeout.
    client: Client,
}

impl AnthropicProvider {
    /// Builds the client from resolved configuration. No network call.
    pub fn new(config: &AIProviderConfig, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GraderError::Configuration(format!("could not build HTTP client: {e}")))?;

        Ok(Self {
            api_key: api_key.to_string(),
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| ANTHROPIC_API_BASE.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn grade(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        if user_prompt.trim().is_empty() {
            return Err(GraderError::Validation("user prompt is empty".to_string()));
        }

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: system_prompt,
            messages: vec![Message {
                role: "user",
                content: user_prompt,
            }],
        };

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        debug!(model = %self.model, "sending grading request to anthropic");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body));
        }

        let envelope: MessagesResponse = response
            .json()
            .await
            .map_err(|e| GraderError::ProviderResponse(format!("malformed envelope: {e}")))?;

        envelope
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| GraderError::ProviderResponse("empty response content".to_string()))
    }
}

/// Transport failures (DNS, refused connection, expired timeout) are the
/// retryable class.
fn map_transport_error(err: reqwest::Error) -> GraderError {
    if err.is_timeout() {
        GraderError::ProviderConnection(format!("request timed out: {err}"))
    } else {
        GraderError::ProviderConnection(err.to_string())
    }
}

/// Auth failures count as connection problems (fix the credential and
/// retry the same request); every other non-2xx is a content-related
/// rejection the caller must not retry unmodified.
fn map_status_error(status: StatusCode, body: &str) -> GraderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            GraderError::ProviderConnection(format!("authentication failed ({status})"))
        }
        _ => GraderError::ProviderResponse(format!("{status}: {body}")),
    }
}

/// Request body for the messages endpoint.
#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

/// One conversation turn.
#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response envelope; only the text blocks matter here.
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

/// A single content block of the reply.
#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::ProviderKind;

    fn config() -> AIProviderConfig {
        AIProviderConfig {
            provider: ProviderKind::Anthropic,
            model: "claude-3-opus-20240229".to_string(),
            api_key: Some("test-key".to_string()),
            base_url: None,
            temperature: 0.0,
            max_tokens: 4096,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn defaults_to_the_public_endpoint() {
        let provider = AnthropicProvider::new(&config(), "test-key").unwrap();
        assert_eq!(provider.base_url, ANTHROPIC_API_BASE);
        assert_eq!(provider.name(), "anthropic");
    }

    #[test]
    fn base_url_override_is_honoured() {
        let mut cfg = config();
        cfg.base_url = Some("http://localhost:9999".to_string());
        let provider = AnthropicProvider::new(&cfg, "test-key").unwrap();
        assert_eq!(provider.base_url, "http://localhost:9999");
    }

    #[test]
    fn auth_statuses_map_to_connection_errors() {
        assert!(matches!(
            map_status_error(StatusCode::UNAUTHORIZED, ""),
            GraderError::ProviderConnection(_)
        ));
        assert!(matches!(
            map_status_error(StatusCode::BAD_REQUEST, "bad"),
            GraderError::ProviderResponse(_)
        ));
        assert!(matches!(
            map_status_error(StatusCode::INTERNAL_SERVER_ERROR, "oops"),
            GraderError::ProviderResponse(_)
        ));
    }
}
