//! Ollama Provider - local inference server adapter.
//!
//! `initialize` is a reachability probe against `GET /api/tags` rather than a
//! credential check; completions use `POST /api/generate` without streaming.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::http::{build_client, check_status, map_send_error};
use crate::domain::foundation::ProviderId;
use crate::ports::{
    Completion, CompletionOptions, FinishReason, Locality, ProviderAdapter, ProviderDescriptor,
    ProviderError, ProviderHealth, ProviderStatus, TokenUsage,
};

pub const OLLAMA_PROVIDER_ID: &str = "ollama";

/// Configuration for the Ollama provider.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub models: Vec<String>,
    /// Deadline for the reachability probe.
    pub probe_timeout: Duration,
    pub timeout: Duration,
}

impl OllamaConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            models: vec![
                "llama2".to_string(),
                "codellama".to_string(),
                "mistral".to_string(),
            ],
            probe_timeout: Duration::from_secs(3),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        if !models.is_empty() {
            self.models = models;
        }
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self::new("http://localhost:11434")
    }
}

/// Local Ollama provider implementation.
pub struct OllamaProvider {
    config: OllamaConfig,
    descriptor: ProviderDescriptor,
    health: ProviderHealth,
    client: Client,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> Self {
        let client = build_client(config.timeout);
        let descriptor = ProviderDescriptor::new(
            ProviderId::from_static(OLLAMA_PROVIDER_ID),
            "Ollama (local)",
            config.models.clone(),
            Locality::Local,
        );
        Self {
            config,
            descriptor,
            health: ProviderHealth::new(),
            client,
        }
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.config.base_url))
            .timeout(self.config.probe_timeout)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.config.probe_timeout))?;
        check_status(response).await.map(|_| ())
    }

    async fn send(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        let model = self.descriptor.resolve_model(options.model.as_deref())?;
        let request = OllamaRequest {
            model,
            prompt: prompt.to_string(),
            stream: false,
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };
        let started = Instant::now();

        let response = self
            .client
            .post(format!("{}/api/generate", self.config.base_url))
            .timeout(options.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_send_error(e, options.timeout))?;
        let response = check_status(response).await?;

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::parse(format!("Failed to parse response: {}", e)))?;

        Ok(parse_response(
            body,
            self.descriptor.id.clone(),
            started.elapsed().as_millis() as u64,
        ))
    }
}

#[async_trait]
impl ProviderAdapter for OllamaProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn health(&self) -> &ProviderHealth {
        &self.health
    }

    async fn initialize(&self) -> Result<ProviderStatus, ProviderError> {
        let started = Instant::now();
        let result = self.probe().await;
        self.health
            .record_latency(started.elapsed().as_millis() as u64);

        match result {
            Ok(()) => {
                debug!(base_url = %self.config.base_url, "Ollama reachable");
                self.health.set_status(ProviderStatus::Ready);
                Ok(ProviderStatus::Ready)
            }
            Err(err) => {
                warn!(base_url = %self.config.base_url, error = %err, "Ollama not reachable");
                self.health.set_status(ProviderStatus::Error);
                Err(err)
            }
        }
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        let started = Instant::now();
        let result = self.send(prompt, options).await;
        self.health
            .observe(&result, started.elapsed().as_millis() as u64);
        result
    }
}

fn parse_response(body: OllamaResponse, provider_id: ProviderId, latency_ms: u64) -> Completion {
    let usage = match (body.prompt_eval_count, body.eval_count) {
        (Some(prompt), Some(completion)) => Some(TokenUsage::new(prompt, completion)),
        _ => None,
    };
    let finish_reason = match body.done_reason.as_deref() {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        _ if body.done => FinishReason::Stop,
        _ => FinishReason::Unknown,
    };

    Completion {
        content: body.response,
        model: body.model,
        provider_id,
        usage,
        finish_reason,
        latency_ms,
        placeholder: false,
    }
}

// ----- Ollama API Types -----

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    model: String,
    response: String,
    #[serde(default)]
    done: bool,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_localhost() {
        let config = OllamaConfig::default();
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.models[0], "llama2");
        assert_eq!(config.probe_timeout, Duration::from_secs(3));
    }

    #[test]
    fn descriptor_is_local() {
        let provider = OllamaProvider::new(OllamaConfig::default());
        assert_eq!(provider.descriptor().locality, Locality::Local);
        assert_eq!(provider.id().as_str(), OLLAMA_PROVIDER_ID);
    }

    #[tokio::test]
    async fn unreachable_server_fails_probe() {
        // Port 9 (discard) is essentially never served over HTTP.
        let config = OllamaConfig::new("http://127.0.0.1:9")
            .with_probe_timeout(Duration::from_millis(300));
        let provider = OllamaProvider::new(config);

        let result = provider.initialize().await;
        assert!(result.is_err());
        assert_eq!(provider.status(), ProviderStatus::Error);
    }

    #[test]
    fn request_uses_num_predict_for_max_tokens() {
        let request = OllamaRequest {
            model: "mistral".into(),
            prompt: "hi".into(),
            stream: false,
            options: OllamaOptions {
                temperature: 0.2,
                num_predict: 50,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["options"]["num_predict"], 50);
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn parses_generate_response() {
        let body: OllamaResponse = serde_json::from_str(
            r#"{"model":"llama2","response":"pwd prints the directory","done":true,
                "prompt_eval_count":9,"eval_count":6}"#,
        )
        .unwrap();
        let completion = parse_response(body, ProviderId::from_static("ollama"), 40);
        assert_eq!(completion.content, "pwd prints the directory");
        assert_eq!(completion.finish_reason, FinishReason::Stop);
        assert_eq!(completion.usage, Some(TokenUsage::new(9, 6)));
    }

    #[test]
    fn missing_counts_mean_no_usage() {
        let body: OllamaResponse =
            serde_json::from_str(r#"{"model":"llama2","response":"x"}"#).unwrap();
        let completion = parse_response(body, ProviderId::from_static("ollama"), 0);
        assert_eq!(completion.usage, None);
        assert_eq!(completion.finish_reason, FinishReason::Unknown);
    }
}
