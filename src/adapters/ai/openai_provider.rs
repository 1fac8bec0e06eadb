//! OpenAI Provider - chat completions API adapter.
//!
//! # Configuration
//!
//! ```ignore
//! let config = OpenAIConfig::new(Some(api_key))
//!     .with_models(vec!["gpt-4-turbo".into()])
//!     .with_base_url("https://api.openai.com/v1");
//!
//! let provider = OpenAIProvider::new(config);
//! ```

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::http::{build_client, check_status, map_send_error};
use crate::domain::foundation::ProviderId;
use crate::ports::{
    Completion, CompletionOptions, FinishReason, Locality, ProviderAdapter, ProviderDescriptor,
    ProviderError, ProviderHealth, ProviderStatus, TokenUsage,
};

pub const OPENAI_PROVIDER_ID: &str = "openai";

/// Configuration for the OpenAI provider.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API key for authentication.
    api_key: Option<Secret<String>>,
    /// Supported models; the first is the default.
    pub models: Vec<String>,
    /// Base URL for the API (default: https://api.openai.com/v1).
    pub base_url: String,
    /// Transport timeout.
    pub timeout: Duration,
}

impl OpenAIConfig {
    /// Creates a new configuration; a missing key leaves the provider in
    /// `MissingCredentials`.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()).map(Secret::new),
            models: default_models(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the supported models.
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        if !models.is_empty() {
            self.models = models;
        }
        self
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.expose_secret().as_str())
    }
}

fn default_models() -> Vec<String> {
    ["gpt-4-turbo", "gpt-4", "gpt-3.5-turbo"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

/// OpenAI API provider implementation.
pub struct OpenAIProvider {
    config: OpenAIConfig,
    descriptor: ProviderDescriptor,
    health: ProviderHealth,
    client: Client,
}

impl OpenAIProvider {
    /// Creates a new OpenAI provider with the given configuration.
    pub fn new(config: OpenAIConfig) -> Self {
        let client = build_client(config.timeout);
        let descriptor = ProviderDescriptor::new(
            ProviderId::from_static(OPENAI_PROVIDER_ID),
            "OpenAI",
            config.models.clone(),
            Locality::Cloud,
        );
        Self {
            config,
            descriptor,
            health: ProviderHealth::new(),
            client,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn to_openai_request(&self, prompt: &str, model: String, options: &CompletionOptions) -> OpenAIRequest {
        OpenAIRequest {
            model,
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        }
    }

    async fn send(
        &self,
        api_key: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        let model = self.descriptor.resolve_model(options.model.as_deref())?;
        let request = self.to_openai_request(prompt, model, options);
        let started = Instant::now();

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(api_key)
            .timeout(options.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_send_error(e, options.timeout))?;
        let response = check_status(response).await?;

        let body: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::parse(format!("Failed to parse response: {}", e)))?;

        parse_response(body, self.descriptor.id.clone(), started.elapsed().as_millis() as u64)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAIProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn health(&self) -> &ProviderHealth {
        &self.health
    }

    async fn initialize(&self) -> Result<ProviderStatus, ProviderError> {
        let status = if self.config.has_api_key() {
            ProviderStatus::Ready
        } else {
            ProviderStatus::MissingCredentials
        };
        self.health.set_status(status);
        Ok(status)
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        let api_key = self.config.api_key().ok_or_else(|| ProviderError::NotReady {
            provider: self.descriptor.id.clone(),
            status: ProviderStatus::MissingCredentials,
        })?;

        let started = Instant::now();
        let result = self.send(api_key, prompt, options).await;
        self.health
            .observe(&result, started.elapsed().as_millis() as u64);
        result
    }
}

fn parse_response(
    body: OpenAIResponse,
    provider_id: ProviderId,
    latency_ms: u64,
) -> Result<Completion, ProviderError> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::parse("No choices in response"))?;

    let finish_reason = match choice.finish_reason.as_deref() {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Unknown,
    };

    Ok(Completion {
        content: choice.message.content.unwrap_or_default(),
        model: body.model,
        provider_id,
        usage: body
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
        finish_reason,
        latency_ms,
        placeholder: false,
    })
}

// ----- OpenAI API Types -----

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
