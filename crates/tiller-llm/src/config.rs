//! Provider configuration and factory
//!
//! Providers are described declaratively (usually in a TOML file) and turned
//! into live adapters by [`build_adapter`]. API keys may be supplied inline or
//! picked up from the conventional environment variable for each vendor.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tiller_core::ProviderAdapter;

use crate::providers::{AnthropicAdapter, GeminiAdapter, OllamaAdapter, OpenAiAdapter};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Which vendor API a provider speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
    Ollama,
}

impl ProviderKind {
    /// Environment variable consulted when no inline API key is configured.
    fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::Ollama => None,
        }
    }
}

/// Declarative description of a single provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ProviderConfig {
    /// Parse a config from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse provider configuration")
    }

    /// Resolve the API key, falling back to the vendor's environment variable.
    fn resolve_api_key(&self) -> Result<Option<String>> {
        if let Some(key) = &self.api_key {
            return Ok(Some(key.clone()));
        }
        match self.kind.api_key_env() {
            Some(var) => std::env::var(var).map(Some).map_err(|_| {
                anyhow!(
                    "No API key configured for {:?} provider and {} is not set",
                    self.kind,
                    var
                )
            }),
            None => Ok(None),
        }
    }
}

/// Create a provider adapter from configuration
pub fn build_adapter(config: &ProviderConfig) -> Result<Arc<dyn ProviderAdapter>> {
    let api_key = config.resolve_api_key()?;

    let adapter: Arc<dyn ProviderAdapter> = match config.kind {
        ProviderKind::OpenAi => Arc::new(OpenAiAdapter::new(
            api_key.unwrap_or_default(),
            config.base_url.clone(),
            config.model.clone(),
            config.timeout_secs,
        )),
        ProviderKind::Anthropic => Arc::new(AnthropicAdapter::new(
            api_key.unwrap_or_default(),
            config.base_url.clone(),
            config.model.clone(),
            config.timeout_secs,
        )),
        ProviderKind::Gemini => Arc::new(GeminiAdapter::new(
            api_key.unwrap_or_default(),
            config.base_url.clone(),
            config.model.clone(),
            config.timeout_secs,
        )),
        ProviderKind::Ollama => Arc::new(OllamaAdapter::new(
            config.base_url.clone(),
            config.model.clone(),
            config.timeout_secs,
        )),
    };

    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml() {
        let config = ProviderConfig::from_toml(
            r#"
            kind = "ollama"
            model = "qwen3:8b"
            "#,
        )
        .unwrap();

        assert_eq!(config.kind, ProviderKind::Ollama);
        assert_eq!(config.model, "qwen3:8b");
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn parses_full_toml() {
        let config = ProviderConfig::from_toml(
            r#"
            kind = "anthropic"
            api_key = "sk-test"
            base_url = "http://localhost:9999"
            model = "claude-sonnet-4-5"
            timeout_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.kind, ProviderKind::Anthropic);
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn rejects_unknown_kind() {
        let result = ProviderConfig::from_toml(
            r#"
            kind = "mistral"
            model = "whatever"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn builds_ollama_without_api_key() {
        let config = ProviderConfig {
            kind: ProviderKind::Ollama,
            api_key: None,
            base_url: None,
            model: "qwen3:8b".to_string(),
            timeout_secs: 60,
        };

        let adapter = build_adapter(&config).unwrap();
        assert_eq!(adapter.provider_name(), "Ollama");
    }

    #[test]
    fn builds_with_inline_api_key() {
        let config = ProviderConfig {
            kind: ProviderKind::OpenAi,
            api_key: Some("sk-test".to_string()),
            base_url: None,
            model: "gpt-4o".to_string(),
            timeout_secs: 60,
        };

        let adapter = build_adapter(&config).unwrap();
        assert_eq!(adapter.provider_name(), "OpenAI");
    }
}
