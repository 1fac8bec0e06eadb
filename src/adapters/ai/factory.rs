//! Builds the provider set from configuration.

use std::sync::Arc;
use std::time::Duration;

use super::{
    AnthropicConfig, AnthropicProvider, OllamaConfig, OllamaProvider, OpenAIConfig, OpenAIProvider,
};
use crate::config::{parse_model_list, ProvidersConfig};
use crate::ports::ProviderAdapter;

/// Instantiates every known provider in registration order.
///
/// Cloud providers are always built so a missing key surfaces as
/// `MissingCredentials` in status reports instead of silently vanishing.
/// Ollama is skipped when disabled.
pub fn build_providers(config: &ProvidersConfig, timeout: Duration) -> Vec<Arc<dyn ProviderAdapter>> {
    let mut providers: Vec<Arc<dyn ProviderAdapter>> = Vec::with_capacity(3);

    let mut openai = OpenAIConfig::new(config.openai_api_key.clone())
        .with_models(parse_model_list(config.openai_models.as_deref()))
        .with_timeout(timeout);
    if let Some(url) = &config.openai_base_url {
        openai = openai.with_base_url(url.clone());
    }
    providers.push(Arc::new(OpenAIProvider::new(openai)));

    let mut anthropic = AnthropicConfig::new(config.anthropic_api_key.clone())
        .with_models(parse_model_list(config.anthropic_models.as_deref()))
        .with_timeout(timeout);
    if let Some(url) = &config.anthropic_base_url {
        anthropic = anthropic.with_base_url(url.clone());
    }
    providers.push(Arc::new(AnthropicProvider::new(anthropic)));

    if config.enable_ollama {
        let ollama = OllamaConfig::new(config.ollama_base_url.clone())
            .with_models(parse_model_list(config.ollama_models.as_deref()))
            .with_probe_timeout(config.probe_timeout());
        providers.push(Arc::new(OllamaProvider::new(ollama)));
    }

    providers
}
