//! Model provider configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Credentials and endpoints for model providers.
///
/// Model lists are comma-separated so they can be set from a single
/// environment variable; the first model is the provider default.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_models: Option<String>,

    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub anthropic_models: Option<String>,

    /// Register the local Ollama server.
    #[serde(default = "default_enable_ollama")]
    pub enable_ollama: bool,

    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,

    pub ollama_models: Option<String>,

    /// Deadline for local reachability probes.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl ProvidersConfig {
    /// Check if OpenAI is configured
    pub fn has_openai(&self) -> bool {
        self.openai_api_key.as_ref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Check if Anthropic is configured
    pub fn has_anthropic(&self) -> bool {
        self.anthropic_api_key.as_ref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Validate provider configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("openai_base_url", self.openai_base_url.as_deref()),
            ("anthropic_base_url", self.anthropic_base_url.as_deref()),
            ("ollama_base_url", Some(self.ollama_base_url.as_str())),
        ] {
            if let Some(url) = value {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(ValidationError::InvalidUrl {
                        field,
                        value: url.to_string(),
                    });
                }
            }
        }
        if self.probe_timeout_ms == 0 {
            return Err(ValidationError::MustBePositive {
                field: "probe_timeout_ms",
            });
        }
        Ok(())
    }
}

/// Splits a comma-separated model list, dropping blanks.
pub fn parse_model_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: None,
            openai_models: None,
            anthropic_api_key: None,
            anthropic_base_url: None,
            anthropic_models: None,
            enable_ollama: default_enable_ollama(),
            ollama_base_url: default_ollama_base_url(),
            ollama_models: None,
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

fn default_enable_ollama() -> bool {
    true
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    3_000
}
