//! Provider Adapter Port - Interface for model backends.
//!
//! A provider adapter normalizes one model backend, either a cloud API or a
//! self-hosted inference server, behind a single completion interface and
//! reports its own readiness.
//!
//! # Design
//!
//! - Cloud and local adapters expose the identical interface; a local
//!   adapter's `initialize` is a reachability probe instead of a credential
//!   check
//! - Adapters never retry. Every failure is a [`ProviderError`] whose
//!   [`is_retryable`](ProviderError::is_retryable) decides what the
//!   orchestration engine does next
//! - Adapters update their own [`ProviderHealth`] after every call and never
//!   touch registry state
//!
//! # Example
//!
//! ```ignore
//! use async_trait::async_trait;
//!
//! struct EchoProvider { descriptor: ProviderDescriptor, health: ProviderHealth }
//!
//! #[async_trait]
//! impl ProviderAdapter for EchoProvider {
//!     fn descriptor(&self) -> &ProviderDescriptor { &self.descriptor }
//!     fn health(&self) -> &ProviderHealth { &self.health }
//!
//!     async fn initialize(&self) -> Result<ProviderStatus, ProviderError> {
//!         self.health.set_status(ProviderStatus::Ready);
//!         Ok(ProviderStatus::Ready)
//!     }
//!
//!     async fn complete(&self, prompt: &str, options: &CompletionOptions)
//!         -> Result<Completion, ProviderError> {
//!         // ...
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

pub use crate::domain::conversation::TokenUsage;
use crate::domain::foundation::ProviderId;

/// Port for model backend interactions.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Static description of this provider.
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Live status and latency owned by this adapter.
    fn health(&self) -> &ProviderHealth;

    /// Validates credentials (cloud) or probes reachability (local).
    ///
    /// Returns `Ready` or `MissingCredentials`; any other failure is an error
    /// and leaves the adapter in `Error` status.
    async fn initialize(&self) -> Result<ProviderStatus, ProviderError>;

    /// Produces one completion for an already enhanced prompt.
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError>;

    /// Current status.
    fn status(&self) -> ProviderStatus {
        self.health().status()
    }

    /// Latency of the most recent call in milliseconds.
    fn last_latency_ms(&self) -> u64 {
        self.health().last_latency_ms()
    }

    /// Convenience accessor for the provider id.
    fn id(&self) -> &ProviderId {
        &self.descriptor().id
    }
}

/// Where a provider runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locality {
    Cloud,
    Local,
}

/// Static description of a registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub display_name: String,
    /// Ordered list; the first entry is the default model.
    pub supported_models: Vec<String>,
    pub locality: Locality,
}

impl ProviderDescriptor {
    pub fn new(
        id: ProviderId,
        display_name: impl Into<String>,
        supported_models: Vec<String>,
        locality: Locality,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            supported_models,
            locality,
        }
    }

    /// The model used when a request does not name one.
    pub fn default_model(&self) -> Option<&str> {
        self.supported_models.first().map(String::as_str)
    }

    /// Resolves a requested model against this provider's default.
    pub fn resolve_model(&self, requested: Option<&str>) -> Result<String, ProviderError> {
        requested
            .or_else(|| self.default_model())
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::InvalidRequest(format!("provider {} has no models", self.id))
            })
    }
}

/// Readiness of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Initializing,
    Ready,
    MissingCredentials,
    Error,
}

impl ProviderStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProviderStatus::Ready)
    }

    fn to_u8(self) -> u8 {
        match self {
            ProviderStatus::Initializing => 0,
            ProviderStatus::Ready => 1,
            ProviderStatus::MissingCredentials => 2,
            ProviderStatus::Error => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ProviderStatus::Ready,
            2 => ProviderStatus::MissingCredentials,
            3 => ProviderStatus::Error,
            _ => ProviderStatus::Initializing,
        }
    }
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderStatus::Initializing => "initializing",
            ProviderStatus::Ready => "ready",
            ProviderStatus::MissingCredentials => "missing_credentials",
            ProviderStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Lock-free status and latency cell owned by one adapter.
#[derive(Debug)]
pub struct ProviderHealth {
    status: AtomicU8,
    last_latency_ms: AtomicU64,
}

impl ProviderHealth {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(ProviderStatus::Initializing.to_u8()),
            last_latency_ms: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> ProviderStatus {
        ProviderStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: ProviderStatus) {
        self.status.store(status.to_u8(), Ordering::Release);
    }

    pub fn last_latency_ms(&self) -> u64 {
        self.last_latency_ms.load(Ordering::Relaxed)
    }

    pub fn record_latency(&self, latency_ms: u64) {
        self.last_latency_ms.store(latency_ms, Ordering::Relaxed);
    }

    /// Applies the status side effect of a completed call.
    ///
    /// Success marks the provider ready, an authentication failure marks it
    /// errored, and transient failures leave the status alone.
    pub fn observe<T>(&self, result: &Result<T, ProviderError>, latency_ms: u64) {
        self.record_latency(latency_ms);
        match result {
            Ok(_) => self.set_status(ProviderStatus::Ready),
            Err(ProviderError::AuthenticationFailed) => self.set_status(ProviderStatus::Error),
            Err(_) => {}
        }
    }
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-call options passed to an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    /// Model override; `None` selects the provider default.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Absolute deadline for this call.
    pub timeout: Duration,
}

impl CompletionOptions {
    pub fn new(temperature: f32, max_tokens: u32, timeout: Duration) -> Self {
        Self {
            model: None,
            temperature,
            max_tokens,
            timeout,
        }
    }

    /// Sets the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the max tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop (end of response).
    Stop,
    /// Hit max_tokens limit.
    Length,
    /// Content was filtered for safety.
    ContentFilter,
    /// Provider did not say.
    Unknown,
}

/// A successful completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub provider_id: ProviderId,
    /// Present when the provider reports token counts.
    pub usage: Option<TokenUsage>,
    pub finish_reason: FinishReason,
    /// Measured wall-clock latency of the call.
    pub latency_ms: u64,
    /// True only for placeholder responses produced in fallback mode.
    #[serde(default)]
    pub placeholder: bool,
}

/// Errors from provider operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Rate limited by provider.
    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u32 },

    /// The call did not finish before its deadline.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Connection-level failure.
    #[error("network error: {message}")]
    Network { message: String },

    /// Provider reported a transient server-side failure.
    #[error("provider unavailable: {message}")]
    Unavailable { message: String },

    /// Credentials rejected.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Request rejected as malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Response could not be understood.
    #[error("parse error: {0}")]
    Parse(String),

    /// The adapter cannot serve calls in its current status.
    #[error("provider {provider} is not ready ({status})")]
    NotReady {
        provider: ProviderId,
        status: ProviderStatus,
    },
}

impl ProviderError {
    /// Creates a rate limited error.
    pub fn rate_limited(retry_after_secs: u32) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Returns true if the engine may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Timeout { .. }
                | ProviderError::Network { .. }
                | ProviderError::Unavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(models: &[&str]) -> ProviderDescriptor {
        ProviderDescriptor::new(
            ProviderId::from_static("test"),
            "Test",
            models.iter().map(|m| m.to_string()).collect(),
            Locality::Cloud,
        )
    }

    #[test]
    fn retryable_errors_are_transient_ones() {
        assert!(ProviderError::rate_limited(30).is_retryable());
        assert!(ProviderError::timeout(Duration::from_secs(1)).is_retryable());
        assert!(ProviderError::network("reset").is_retryable());
        assert!(ProviderError::unavailable("502").is_retryable());

        assert!(!ProviderError::AuthenticationFailed.is_retryable());
        assert!(!ProviderError::InvalidRequest("bad".into()).is_retryable());
        assert!(!ProviderError::parse("garbage").is_retryable());
        assert!(!ProviderError::NotReady {
            provider: ProviderId::from_static("x"),
            status: ProviderStatus::MissingCredentials,
        }
        .is_retryable());
    }

    #[test]
    fn error_display_is_informative() {
        assert_eq!(
            ProviderError::rate_limited(60).to_string(),
            "rate limited: retry after 60s"
        );
        assert_eq!(
            ProviderError::timeout(Duration::from_millis(1500)).to_string(),
            "request timed out after 1500ms"
        );
        assert_eq!(
            ProviderError::NotReady {
                provider: ProviderId::from_static("claude"),
                status: ProviderStatus::MissingCredentials,
            }
            .to_string(),
            "provider claude is not ready (missing_credentials)"
        );
    }

    #[test]
    fn health_starts_initializing_and_tracks_updates() {
        let health = ProviderHealth::new();
        assert_eq!(health.status(), ProviderStatus::Initializing);

        health.set_status(ProviderStatus::MissingCredentials);
        assert_eq!(health.status(), ProviderStatus::MissingCredentials);

        health.record_latency(120);
        assert_eq!(health.last_latency_ms(), 120);
    }

    #[test]
    fn observe_applies_call_side_effects() {
        let health = ProviderHealth::new();

        health.observe::<()>(&Ok(()), 50);
        assert_eq!(health.status(), ProviderStatus::Ready);
        assert_eq!(health.last_latency_ms(), 50);

        health.observe::<()>(&Err(ProviderError::rate_limited(1)), 70);
        assert_eq!(health.status(), ProviderStatus::Ready);
        assert_eq!(health.last_latency_ms(), 70);

        health.observe::<()>(&Err(ProviderError::AuthenticationFailed), 10);
        assert_eq!(health.status(), ProviderStatus::Error);
    }

    #[test]
    fn model_resolution_prefers_request_then_default() {
        let d = descriptor(&["big", "small"]);
        assert_eq!(d.resolve_model(Some("small")).unwrap(), "small");
        assert_eq!(d.resolve_model(None).unwrap(), "big");
        assert!(descriptor(&[]).resolve_model(None).is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ProviderStatus::MissingCredentials).unwrap();
        assert_eq!(json, "\"missing_credentials\"");
        assert_eq!(ProviderStatus::Ready.to_string(), "ready");
    }
}
