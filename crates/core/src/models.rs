//! # Models
//!
//! Centralized language-model configuration: which provider and model to
//! talk to, and the timeout/retry/sampling settings the gateway applies to
//! every call.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use crate::gateway::{HttpChatModel, LanguageModel, ProviderModel, RetryPolicy};

/// Supported LLM providers
///
/// - Http - any OpenAI-compatible `/v1/chat/completions` endpoint (`base_url` required)
/// - Anthropic (Claude) - `ANTHROPIC_API_KEY`
/// - OpenAI (GPT) - `OPENAI_API_KEY`
/// - Gemini (Google) - `GEMINI_API_KEY`
/// - OpenRouter (Gateway) - `OPENROUTER_API_KEY`
/// - Grok (xAI) - `XAI_API_KEY`
/// - DeepSeek - `DEEPSEEK_API_KEY`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Http,
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
    Gemini,
    OpenRouter,
    Grok,
    DeepSeek,
}

impl LlmProvider {
    pub fn all() -> Vec<LlmProvider> {
        vec![
            LlmProvider::Http,
            LlmProvider::Anthropic,
            LlmProvider::OpenAI,
            LlmProvider::Gemini,
            LlmProvider::OpenRouter,
            LlmProvider::Grok,
            LlmProvider::DeepSeek,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            LlmProvider::Http => "OpenAI-compatible HTTP",
            LlmProvider::Anthropic => "Anthropic",
            LlmProvider::OpenAI => "OpenAI",
            LlmProvider::Gemini => "Gemini",
            LlmProvider::OpenRouter => "OpenRouter",
            LlmProvider::Grok => "Grok",
            LlmProvider::DeepSeek => "DeepSeek",
        }
    }

    /// Lowercase id used in config files and the API
    pub fn id(&self) -> &'static str {
        match self {
            LlmProvider::Http => "http",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::OpenAI => "openai",
            LlmProvider::Gemini => "gemini",
            LlmProvider::OpenRouter => "openrouter",
            LlmProvider::Grok => "grok",
            LlmProvider::DeepSeek => "deepseek",
        }
    }

    /// Parse the id produced by [`LlmProvider::id`]
    pub fn from_id(id: &str) -> Option<LlmProvider> {
        match id {
            "http" => Some(LlmProvider::Http),
            "anthropic" => Some(LlmProvider::Anthropic),
            "openai" => Some(LlmProvider::OpenAI),
            "gemini" => Some(LlmProvider::Gemini),
            "openrouter" => Some(LlmProvider::OpenRouter),
            "grok" => Some(LlmProvider::Grok),
            "deepseek" => Some(LlmProvider::DeepSeek),
            _ => None,
        }
    }

    /// Whether this provider honours a custom base URL
    pub fn supports_base_url(&self) -> bool {
        matches!(self, LlmProvider::Http | LlmProvider::OpenAI)
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Http => "Qwen3_2507",
            LlmProvider::Anthropic => "claude-sonnet-4-20250514",
            LlmProvider::OpenAI => "gpt-4o",
            LlmProvider::Gemini => "gemini-2.0-flash-exp",
            LlmProvider::OpenRouter => "anthropic/claude-3.5-sonnet",
            LlmProvider::Grok => "grok-2",
            LlmProvider::DeepSeek => "deepseek-chat",
        }
    }
}

/// Provider and model selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: LlmProvider,
    /// Model name (e.g., "Qwen3_2507", "gpt-4o")
    pub model: String,
    /// Endpoint for `Http`, optional override for OpenAI
    pub base_url: Option<String>,
    /// Environment variable holding a bearer token for `Http` endpoints
    pub api_key_env: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Http,
            model: LlmProvider::Http.default_model().to_string(),
            base_url: Some("http://localhost:8000/v1/chat/completions".to_string()),
            api_key_env: None,
        }
    }
}

impl ModelConfig {
    pub fn with_provider(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
            api_key_env: None,
        }
    }

    /// Set base URL (the endpoint for `Http`, an override for OpenAI)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

/// Everything the gateway needs to make and retry a call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    #[serde(flatten)]
    pub model: ModelConfig,
    /// Per-attempt timeout
    pub timeout_secs: u64,
    /// Total attempts on transport failure (1 = no retry)
    pub max_retries: u32,
    /// Overrides every task's own temperature when set
    pub temperature: Option<f32>,
    pub top_p: f32,
    /// Overrides every task's own output limit when set
    pub max_tokens: Option<u32>,
    /// Prepended to the system prompt of every request
    pub system_instruction: Option<String>,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            timeout_secs: 120,
            max_retries: 3,
            temperature: None,
            top_p: 1.0,
            max_tokens: None,
            system_instruction: None,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_retries,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "gateway timeout_secs",
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::GatewayRetries);
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::Temperature(temperature));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(ConfigError::MaxTokens);
        }
        Ok(())
    }

    /// Build the backend this configuration points at
    pub fn create_model(&self) -> anyhow::Result<Arc<dyn LanguageModel>> {
        match self.model.provider {
            LlmProvider::Http => Ok(Arc::new(HttpChatModel::from_config(self)?)),
            _ => Ok(Arc::new(ProviderModel::new(self.model.clone()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.model.provider, LlmProvider::Http);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.timeout(), Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_provider_ids_round_trip() {
        for provider in LlmProvider::all() {
            let id = serde_json::to_value(&provider).unwrap();
            assert_eq!(id.as_str(), Some(provider.id()));
            assert_eq!(LlmProvider::from_id(provider.id()), Some(provider));
        }
        assert_eq!(LlmProvider::from_id("nope"), None);
    }

    #[test]
    fn test_base_url_support() {
        assert!(LlmProvider::Http.supports_base_url());
        assert!(LlmProvider::OpenAI.supports_base_url());
        assert!(!LlmProvider::Anthropic.supports_base_url());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = GatewayConfig::default();
        config.max_retries = 0;
        assert_eq!(config.validate(), Err(ConfigError::GatewayRetries));

        let mut config = GatewayConfig::default();
        config.temperature = Some(3.0);
        assert!(matches!(config.validate(), Err(ConfigError::Temperature(_))));

        let mut config = GatewayConfig::default();
        config.max_tokens = Some(0);
        assert_eq!(config.validate(), Err(ConfigError::MaxTokens));

        let mut config = GatewayConfig::default();
        config.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroDuration { .. })));
    }

    #[test]
    fn test_flattened_serialization() {
        let config = GatewayConfig {
            model: ModelConfig::with_provider(LlmProvider::OpenAI, "gpt-4o"),
            ..GatewayConfig::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["provider"], "openai");
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["max_retries"], 3);
    }
}
