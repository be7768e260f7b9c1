//! AI provider selection and backend construction.
//!
//! Five providers are supported. Anthropic and OpenAI speak their native
//! APIs; LM Studio and OpenRouter are OpenAI-compatible so they reuse the
//! OpenAI client with a different base URL; Ollama has its own client.

use std::str::FromStr;
use std::sync::Arc;

use crate::infrastructure::anthropic::{
    AnthropicClient, DEFAULT_ANTHROPIC_BASE_URL, DEFAULT_ANTHROPIC_MODEL,
};
use crate::infrastructure::ollama::{OllamaClient, DEFAULT_OLLAMA_BASE_URL, DEFAULT_OLLAMA_MODEL};
use crate::infrastructure::openai::{OpenAiClient, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL};
use crate::infrastructure::ports::ModelBackend;

pub const DEFAULT_LM_STUDIO_BASE_URL: &str = "http://localhost:1234/v1";
pub const DEFAULT_LM_STUDIO_MODEL: &str = "local-model";
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_OPENROUTER_MODEL: &str = "anthropic/claude-3.5-sonnet";

/// Errors from provider configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown AI provider: {0}. Available: anthropic, openai, ollama, lm_studio, openrouter")]
    UnknownProvider(String),
    #[error("{0} environment variable is required")]
    MissingApiKey(&'static str),
}

/// Supported AI providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAi,
    Ollama,
    LmStudio,
    OpenRouter,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::Ollama => "ollama",
            Provider::LmStudio => "lm_studio",
            Provider::OpenRouter => "openrouter",
        }
    }

    /// All provider names, in display order.
    pub fn names() -> [&'static str; 5] {
        ["anthropic", "openai", "ollama", "lm_studio", "openrouter"]
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Anthropic => DEFAULT_ANTHROPIC_MODEL,
            Provider::OpenAi => DEFAULT_OPENAI_MODEL,
            Provider::Ollama => DEFAULT_OLLAMA_MODEL,
            Provider::LmStudio => DEFAULT_LM_STUDIO_MODEL,
            Provider::OpenRouter => DEFAULT_OPENROUTER_MODEL,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Anthropic => DEFAULT_ANTHROPIC_BASE_URL,
            Provider::OpenAi => DEFAULT_OPENAI_BASE_URL,
            Provider::Ollama => DEFAULT_OLLAMA_BASE_URL,
            Provider::LmStudio => DEFAULT_LM_STUDIO_BASE_URL,
            Provider::OpenRouter => DEFAULT_OPENROUTER_BASE_URL,
        }
    }

    /// Models worth suggesting in a provider picker UI.
    pub fn recommended_models(&self) -> &'static [&'static str] {
        match self {
            Provider::Anthropic => &[
                "claude-3-5-sonnet-20241022",
                "claude-3-opus-20240229",
                "claude-3-sonnet-20240229",
                "claude-3-haiku-20240307",
            ],
            Provider::OpenAi => &["gpt-4-turbo-preview", "gpt-4", "gpt-3.5-turbo"],
            Provider::Ollama => &[
                "phi3:mini",
                "llama3.1:8b",
                "mistral:7b-instruct",
                "llama2",
                "mixtral",
            ],
            Provider::LmStudio => &["local-model"],
            Provider::OpenRouter => &[
                "anthropic/claude-3.5-sonnet",
                "openai/gpt-4-turbo-preview",
                "meta-llama/llama-2-70b-chat",
                "mistralai/mixtral-8x7b-instruct",
            ],
        }
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAi),
            "ollama" => Ok(Provider::Ollama),
            "lm_studio" => Ok(Provider::LmStudio),
            "openrouter" => Ok(Provider::OpenRouter),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// Resolved provider configuration: which provider, which model, where.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
}

impl ProviderConfig {
    /// Read provider configuration from the environment.
    ///
    /// `AI_PROVIDER` selects the provider (default anthropic), `AI_MODEL`
    /// overrides its default model. Base URLs and API keys come from
    /// provider-specific variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider_name =
            std::env::var("AI_PROVIDER").unwrap_or_else(|_| "anthropic".to_string());
        let provider = Provider::from_str(&provider_name)?;

        let model = std::env::var("AI_MODEL")
            .unwrap_or_else(|_| provider.default_model().to_string());

        let base_url = match provider {
            Provider::Anthropic => std::env::var("ANTHROPIC_BASE_URL"),
            Provider::OpenAi => std::env::var("OPENAI_BASE_URL"),
            Provider::Ollama => {
                std::env::var("OLLAMA_URL").or_else(|_| std::env::var("OLLAMA_BASE_URL"))
            }
            Provider::LmStudio => std::env::var("LM_STUDIO_URL"),
            Provider::OpenRouter => std::env::var("OPENROUTER_URL"),
        }
        .unwrap_or_else(|_| provider.default_base_url().to_string());

        let api_key = match provider {
            Provider::Anthropic => std::env::var("ANTHROPIC_API_KEY").ok(),
            Provider::OpenAi => std::env::var("OPENAI_API_KEY").ok(),
            Provider::Ollama => None,
            // LM Studio ignores the key but its OpenAI-compatible API wants one
            Provider::LmStudio => Some(
                std::env::var("LM_STUDIO_API_KEY").unwrap_or_else(|_| "lm-studio".to_string()),
            ),
            Provider::OpenRouter => std::env::var("OPENROUTER_API_KEY").ok(),
        };

        Ok(Self {
            provider,
            model,
            base_url,
            api_key,
        })
    }

    /// Build the model backend for this configuration.
    pub fn create_backend(&self) -> Result<Arc<dyn ModelBackend>, ConfigError> {
        match self.provider {
            Provider::Anthropic => {
                let key = self
                    .api_key
                    .as_deref()
                    .ok_or(ConfigError::MissingApiKey("ANTHROPIC_API_KEY"))?;
                Ok(Arc::new(AnthropicClient::new(
                    &self.base_url,
                    key,
                    &self.model,
                )))
            }
            Provider::OpenAi => {
                let key = self
                    .api_key
                    .as_deref()
                    .ok_or(ConfigError::MissingApiKey("OPENAI_API_KEY"))?;
                Ok(Arc::new(OpenAiClient::new(&self.base_url, key, &self.model)))
            }
            Provider::Ollama => Ok(Arc::new(OllamaClient::new(&self.base_url, &self.model))),
            Provider::LmStudio => {
                let key = self.api_key.as_deref().unwrap_or("lm-studio");
                Ok(Arc::new(OpenAiClient::new(&self.base_url, key, &self.model)))
            }
            Provider::OpenRouter => {
                let key = self
                    .api_key
                    .as_deref()
                    .ok_or(ConfigError::MissingApiKey("OPENROUTER_API_KEY"))?;
                Ok(Arc::new(OpenAiClient::new(&self.base_url, key, &self.model)))
            }
        }
    }
}
