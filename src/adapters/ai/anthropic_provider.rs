//! Anthropic Provider - Messages API adapter for Claude models.

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

pub const ANTHROPIC_PROVIDER_ID: &str = "anthropic";

/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Configuration for the Anthropic provider.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    api_key: Option<Secret<String>>,
    /// Supported models; the first is the default.
    pub models: Vec<String>,
    /// Base URL for the API (default: https://api.anthropic.com).
    pub base_url: String,
    pub timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()).map(Secret::new),
            models: vec![
                "claude-3-opus-20240229".to_string(),
                "claude-3-sonnet-20240229".to_string(),
                "claude-3-haiku-20240307".to_string(),
            ],
            base_url: "https://api.anthropic.com".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        if !models.is_empty() {
            self.models = models;
        }
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

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

/// Anthropic API provider implementation.
pub struct AnthropicProvider {
    config: AnthropicConfig,
    descriptor: ProviderDescriptor,
    health: ProviderHealth,
    client: Client,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Self {
        let client = build_client(config.timeout);
        let descriptor = ProviderDescriptor::new(
            ProviderId::from_static(ANTHROPIC_PROVIDER_ID),
            "Anthropic Claude",
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

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url)
    }

    fn to_anthropic_request(
        &self,
        prompt: &str,
        model: String,
        options: &CompletionOptions,
    ) -> AnthropicRequest {
        AnthropicRequest {
            model,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: options.max_tokens,
            // Anthropic caps temperature at 1.0
            temperature: options.temperature.min(1.0),
        }
    }

    async fn send(
        &self,
        api_key: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        let model = self.descriptor.resolve_model(options.model.as_deref())?;
        let request = self.to_anthropic_request(prompt, model, options);
        let started = Instant::now();

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(options.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_send_error(e, options.timeout))?;
        let response = check_status(response).await?;

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::parse(format!("Failed to parse response: {}", e)))?;

        parse_response(body, self.descriptor.id.clone(), started.elapsed().as_millis() as u64)
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
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
    body: AnthropicResponse,
    provider_id: ProviderId,
    latency_ms: u64,
) -> Result<Completion, ProviderError> {
    let content: String = body
        .content
        .iter()
        .filter(|block| block.block_type == "text")
        .filter_map(|block| block.text.as_deref())
        .collect();

    if content.is_empty() && body.content.is_empty() {
        return Err(ProviderError::parse("No content blocks in response"));
    }

    let finish_reason = match body.stop_reason.as_deref() {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        _ => FinishReason::Unknown,
    };

    Ok(Completion {
        content,
        model: body.model,
        provider_id,
        usage: Some(TokenUsage::new(
            body.usage.input_tokens,
            body.usage.output_tokens,
        )),
        finish_reason,
        latency_ms,
        placeholder: false,
    })
}

// ----- Anthropic API Types -----

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}
