//! The multi-provider AI client abstraction.
//!
//! Each backend is wrapped into the same `grade(system_prompt, user_prompt)
//! -> raw text` capability, with errors mapped uniformly so upstream code
//! never branches on provider identity: transport/timeout/auth failures
//! become [`GraderError::ProviderConnection`] (transient, caller may
//! retry), anything the provider answered-and-rejected becomes
//! [`GraderError::ProviderResponse`] (do not retry unmodified). No retries
//! happen inside this layer.

pub mod anthropic;
pub mod openai;

use std::fmt::Debug;

use async_trait::async_trait;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

use crate::{
    config::{AIProviderConfig, ProviderKind},
    error::{GraderError, Result},
};

/// A normalized AI text-generation backend.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Short provider name for logs and error text.
    fn name(&self) -> &'static str;

    /// Sends one grading request and returns the model's raw text reply.
    /// `user_prompt` must be non-empty; parameter values outside the
    /// provider's accepted range are passed through and any provider-side
    /// rejection surfaces as [`GraderError::ProviderResponse`].
    async fn grade(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Constructs the provider selected by `config`.
///
/// Purely local: validates the credential and builds a stateless client
/// object, no network call. A missing credential for the selected backend
/// is a [`GraderError::Configuration`].
pub fn create_provider(config: &AIProviderConfig) -> Result<Box<dyn Provider>> {
    let api_key = config
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            GraderError::Configuration(format!(
                "no API key configured for the {} provider",
                config.provider
            ))
        })?;

    Ok(match config.provider {
        ProviderKind::Anthropic => Box::new(AnthropicProvider::new(config, api_key)?),
        ProviderKind::OpenAi => Box::new(OpenAiProvider::new(config, api_key)),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config(provider: ProviderKind, api_key: Option<&str>) -> AIProviderConfig {
        AIProviderConfig {
            provider,
            model: "test-model".to_string(),
            api_key: api_key.map(str::to_string),
            base_url: None,
            temperature: 0.0,
            max_tokens: 1024,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn missing_credential_is_a_configuration_error() {
        for provider in [ProviderKind::Anthropic, ProviderKind::OpenAi] {
            let err = create_provider(&config(provider, None)).unwrap_err();
            assert!(matches!(err, GraderError::Configuration(_)));
        }
    }

    #[test]
    fn blank_credential_is_a_configuration_error() {
        let err = create_provider(&config(ProviderKind::Anthropic, Some("  "))).unwrap_err();
        assert!(matches!(err, GraderError::Configuration(_)));
    }

    #[test]
    fn factory_builds_the_selected_backend() {
        let anthropic = create_provider(&config(ProviderKind::Anthropic, Some("key"))).unwrap();
        assert_eq!(anthropic.name(), "anthropic");

        let openai = create_provider(&config(ProviderKind::OpenAi, Some("key"))).unwrap();
        assert_eq!(openai.name(), "openai");
    }

    #[tokio::test]
    async fn empty_user_prompt_is_rejected_before_any_network_call() {
        let provider = create_provider(&config(ProviderKind::Anthropic, Some("key"))).unwrap();
        let err = provider.grade("system", "").await.unwrap_err();
        assert!(matches!(err, GraderError::Validation(_)));
    }
}
