//! AI Provider Adapters.
//!
//! Implementations of the `ProviderAdapter` port for the supported model
//! providers.
//!
//! ## Available Adapters
//!
//! - `OpenAIProvider` - OpenAI chat completions (GPT-4, GPT-3.5)
//! - `AnthropicProvider` - Anthropic messages API (Claude 3 family)
//! - `OllamaProvider` - Local Ollama server
//! - `MockProvider` - Configurable mock for testing

mod anthropic_provider;
mod factory;
mod http;
mod mock_provider;
mod ollama_provider;
mod openai_provider;

pub use anthropic_provider::{AnthropicConfig, AnthropicProvider, ANTHROPIC_PROVIDER_ID};
pub use factory::build_providers;
pub use mock_provider::{MockInit, MockProvider, MockResponse};
pub use ollama_provider::{OllamaConfig, OllamaProvider, OLLAMA_PROVIDER_ID};
pub use openai_provider::{OpenAIConfig, OpenAIProvider, OPENAI_PROVIDER_ID};
