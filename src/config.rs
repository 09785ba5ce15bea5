//! Configuration resolution: JSON config file merged with environment
//! overrides, environment winning. Resolved once per process.

use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{GraderError, Result};

/// Default Anthropic messages endpoint.
pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
/// Default OpenAI-compatible endpoint.
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
/// Model used when the Anthropic provider is selected with no model set.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-opus-20240229";
/// Model used when the OpenAI provider is selected with no model set.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4";
/// Temperature 0 for deterministic grading unless overridden.
pub const DEFAULT_TEMPERATURE: f32 = 0.0;
/// Response budget for a grading call.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
/// Blocking network timeout for a single provider call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 90;

/// Which AI backend services a grading call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Anthropic messages API.
    Anthropic,
    /// OpenAI chat completions, also serving OpenAI-compatible custom
    /// endpoints by varying only the base URL.
    OpenAi,
}

impl FromStr for ProviderKind {
    type Err = GraderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" => Ok(ProviderKind::Anthropic),
            "openai" => Ok(ProviderKind::OpenAi),
            other => Err(GraderError::Configuration(format!(
                "unsupported provider type: {other}"
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

/// Resolved provider settings handed to the provider factory.
#[derive(Debug, Clone)]
pub struct AIProviderConfig {
    /// Selected backend.
    pub provider: ProviderKind,
    /// Model identifier sent with every request.
    pub model: String,
    /// Credential for the selected backend, if one was found.
    pub api_key: Option<String>,
    /// Endpoint override; `None` means the provider's default.
    pub base_url: Option<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Response token budget.
    pub max_tokens: u32,
    /// Network timeout for the single provider call.
    pub timeout: Duration,
}

/// `ai` section of the JSON config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AiSection {
    provider: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

/// `storage` section of the JSON config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct StorageSection {
    base_dir: Option<PathBuf>,
}

/// On-disk configuration file shape. Every field is optional; a missing
/// file resolves to all defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct FileConfig {
    ai: AiSection,
    storage: StorageSection,
}

impl FileConfig {
    /// Reads the config file at `path`, treating a missing file as empty.
    fn read(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Environment values consulted during resolution. Construct via
/// [`EnvOverrides::from_env`]; tests build it directly.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    /// Explicit provider name (`DG_PROVIDER`).
    pub provider: Option<String>,
    /// Model override (`DG_MODEL`).
    pub model: Option<String>,
    /// Anthropic credential (`ANTHROPIC_API_KEY`).
    pub anthropic_api_key: Option<String>,
    /// OpenAI-compatible credential (`OPENAI_API_KEY`).
    pub openai_api_key: Option<String>,
    /// OpenAI-compatible endpoint override (`OPENAI_BASE_URL`).
    pub openai_base_url: Option<String>,
    /// Temperature override (`DG_TEMPERATURE`).
    pub temperature: Option<f32>,
    /// Max-token override (`DG_MAX_TOKENS`).
    pub max_tokens: Option<u32>,
    /// Timeout override in seconds (`DG_TIMEOUT_SECS`).
    pub timeout_secs: Option<u64>,
    /// Storage directory override (`DG_BASE_DIR`).
    pub base_dir: Option<PathBuf>,
}

/// Returns a trimmed, non-empty environment value, if any.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

impl EnvOverrides {
    /// Reads every recognised environment variable.
    pub fn from_env() -> Self {
        Self {
            provider: env_var("DG_PROVIDER"),
            model: env_var("DG_MODEL"),
            anthropic_api_key: env_var("ANTHROPIC_API_KEY"),
            openai_api_key: env_var("OPENAI_API_KEY"),
            openai_base_url: env_var("OPENAI_BASE_URL"),
            temperature: env_var("DG_TEMPERATURE").and_then(|s| s.parse().ok()),
            max_tokens: env_var("DG_MAX_TOKENS").and_then(|s| s.parse().ok()),
            timeout_secs: env_var("DG_TIMEOUT_SECS").and_then(|s| s.parse().ok()),
            base_dir: env_var("DG_BASE_DIR").map(PathBuf::from),
        }
    }
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct GraderConfig {
    /// Provider settings for grading calls.
    pub ai: AIProviderConfig,
    /// Root of the discussion storage tree.
    pub base_dir: PathBuf,
}

impl GraderConfig {
    /// Loads the config file (path from `DG_CONFIG`, default
    /// `config/config.json`) and merges environment overrides on top.
    pub fn load() -> Result<Self> {
        let path = env_var("DG_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config/config.json"));
        let file = FileConfig::read(&path)?;
        Self::resolve(file, EnvOverrides::from_env())
    }

    /// Merges file values and environment overrides into a resolved config.
    /// Environment values take precedence over file values.
    fn resolve(file: FileConfig, env: EnvOverrides) -> Result<Self> {
        let explicit = match env.provider.as_deref().or(file.ai.provider.as_deref()) {
            Some(name) => Some(name.parse::<ProviderKind>()?),
            None => None,
        };

        // Selection policy: explicit name, then an Anthropic credential,
        // then an OpenAI-compatible credential, then Anthropic.
        let provider = explicit.unwrap_or_else(|| {
            if env.anthropic_api_key.is_some() {
                ProviderKind::Anthropic
            } else if env.openai_api_key.is_some() {
                ProviderKind::OpenAi
            } else {
                ProviderKind::Anthropic
            }
        });

        let api_key = match provider {
            ProviderKind::Anthropic => env.anthropic_api_key,
            ProviderKind::OpenAi => env.openai_api_key,
        }
        .or(file.ai.api_key);

        let model = env
            .model
            .or(file.ai.model)
            .unwrap_or_else(|| match provider {
                ProviderKind::Anthropic => DEFAULT_ANTHROPIC_MODEL.to_string(),
                ProviderKind::OpenAi => DEFAULT_OPENAI_MODEL.to_string(),
            });

        let base_url = match provider {
            ProviderKind::Anthropic => file.ai.base_url,
            ProviderKind::OpenAi => env.openai_base_url.or(file.ai.base_url),
        };

        let ai = AIProviderConfig {
            provider,
            model,
            api_key,
            base_url,
            temperature: env
                .temperature
                .or(file.ai.temperature)
                .unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: env
                .max_tokens
                .or(file.ai.max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            timeout: Duration::from_secs(
                env.timeout_secs
                    .or(file.ai.timeout_secs)
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        };

        Ok(Self {
            ai,
            base_dir: env
                .base_dir
                .or(file.storage.base_dir)
                .unwrap_or_else(|| PathBuf::from("discussions")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_env() -> EnvOverrides {
        EnvOverrides::default()
    }

    #[test]
    fn defaults_select_anthropic() {
        let cfg = GraderConfig::resolve(FileConfig::default(), empty_env()).unwrap();
        assert_eq!(cfg.ai.provider, ProviderKind::Anthropic);
        assert_eq!(cfg.ai.model, DEFAULT_ANTHROPIC_MODEL);
        assert_eq!(cfg.ai.temperature, 0.0);
        assert_eq!(cfg.ai.max_tokens, 4096);
        assert_eq!(cfg.base_dir, PathBuf::from("discussions"));
    }

    #[test]
    fn openai_credential_wins_when_no_anthropic_key() {
        let env = EnvOverrides {
            openai_api_key: Some("sk-test".into()),
            ..empty_env()
        };
        let cfg = GraderConfig::resolve(FileConfig::default(), env).unwrap();
        assert_eq!(cfg.ai.provider, ProviderKind::OpenAi);
        assert_eq!(cfg.ai.model, DEFAULT_OPENAI_MODEL);
        assert_eq!(cfg.ai.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn anthropic_credential_beats_openai_credential() {
        let env = EnvOverrides {
            anthropic_api_key: Some("sk-ant".into()),
            openai_api_key: Some("sk-oai".into()),
            ..empty_env()
        };
        let cfg = GraderConfig::resolve(FileConfig::default(), env).unwrap();
        assert_eq!(cfg.ai.provider, ProviderKind::Anthropic);
        assert_eq!(cfg.ai.api_key.as_deref(), Some("sk-ant"));
    }

    #[test]
    fn environment_wins_over_file() {
        let file = FileConfig {
            ai: AiSection {
                provider: Some("anthropic".into()),
                model: Some("file-model".into()),
                temperature: Some(0.7),
                ..AiSection::default()
            },
            ..FileConfig::default()
        };
        let env = EnvOverrides {
            provider: Some("openai".into()),
            model: Some("env-model".into()),
            openai_api_key: Some("sk".into()),
            ..empty_env()
        };
        let cfg = GraderConfig::resolve(file, env).unwrap();
        assert_eq!(cfg.ai.provider, ProviderKind::OpenAi);
        assert_eq!(cfg.ai.model, "env-model");
        assert_eq!(cfg.ai.temperature, 0.7);
    }

    #[test]
    fn unknown_provider_name_is_a_configuration_error() {
        let env = EnvOverrides {
            provider: Some("gemini".into()),
            ..empty_env()
        };
        let err = GraderConfig::resolve(FileConfig::default(), env).unwrap_err();
        assert!(matches!(err, GraderError::Configuration(_)));
    }
}
