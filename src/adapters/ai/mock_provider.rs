//! Mock provider for testing.
//!
//! Provides a configurable implementation of the `ProviderAdapter` port so
//! tests and offline demos run without calling real model APIs.
//!
//! # Features
//!
//! - Pre-configured responses, consumed in order
//! - A repeating error once the queue is empty, for retry-budget tests
//! - Simulated delays for timeout testing
//! - Configurable initialization outcome
//! - Call tracking for verification
//!
//! # Example
//!
//! ```ignore
//! let provider = MockProvider::new("mock")
//!     .with_response("Hello, I'm the assistant!")
//!     .with_delay(Duration::from_millis(100));
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::domain::foundation::ProviderId;
use crate::ports::{
    Completion, CompletionOptions, FinishReason, Locality, ProviderAdapter, ProviderDescriptor,
    ProviderError, ProviderHealth, ProviderStatus, TokenUsage,
};

/// A configured mock response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Success { content: String, usage: TokenUsage },
    Error(ProviderError),
}

/// How `initialize` should behave.
#[derive(Debug, Clone)]
pub enum MockInit {
    Ready,
    MissingCredentials,
    Fail(ProviderError),
}

/// Mock provider; clones share queues, call history and health.
#[derive(Debug, Clone)]
pub struct MockProvider {
    descriptor: ProviderDescriptor,
    health: Arc<ProviderHealth>,
    init: MockInit,
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    /// Returned whenever the queue is empty.
    exhausted: Option<ProviderError>,
    delay: Duration,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    /// Creates a mock that initializes as ready and answers "Mock response".
    pub fn new(id: &'static str) -> Self {
        Self {
            descriptor: ProviderDescriptor::new(
                ProviderId::from_static(id),
                format!("Mock ({})", id),
                vec!["mock-model-1".to_string()],
                Locality::Local,
            ),
            health: Arc::new(ProviderHealth::new()),
            init: MockInit::Ready,
            responses: Arc::new(Mutex::new(VecDeque::new())),
            exhausted: None,
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Adds a successful response to the queue.
    pub fn with_response(self, content: impl Into<String>) -> Self {
        lock(&self.responses).push_back(MockResponse::Success {
            content: content.into(),
            usage: TokenUsage::new(10, 20),
        });
        self
    }

    /// Adds an error response to the queue.
    pub fn with_error(self, error: ProviderError) -> Self {
        lock(&self.responses).push_back(MockResponse::Error(error));
        self
    }

    /// Fails every call after the queue is drained.
    pub fn failing_with(mut self, error: ProviderError) -> Self {
        self.exhausted = Some(error);
        self
    }

    /// Sets simulated latency per request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the initialization outcome.
    pub fn with_init(mut self, init: MockInit) -> Self {
        self.init = init;
        self
    }

    /// Returns the number of calls made to this provider.
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn next_response(&self) -> MockResponse {
        if let Some(response) = lock(&self.responses).pop_front() {
            return response;
        }
        match &self.exhausted {
            Some(err) => MockResponse::Error(err.clone()),
            None => MockResponse::Success {
                content: "Mock response".to_string(),
                usage: TokenUsage::new(5, 10),
            },
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn health(&self) -> &ProviderHealth {
        &self.health
    }

    async fn initialize(&self) -> Result<ProviderStatus, ProviderError> {
        match &self.init {
            MockInit::Ready => {
                self.health.set_status(ProviderStatus::Ready);
                Ok(ProviderStatus::Ready)
            }
            MockInit::MissingCredentials => {
                self.health.set_status(ProviderStatus::MissingCredentials);
                Ok(ProviderStatus::MissingCredentials)
            }
            MockInit::Fail(err) => {
                self.health.set_status(ProviderStatus::Error);
                Err(err.clone())
            }
        }
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        lock(&self.calls).push(prompt.to_string());
        let started = Instant::now();

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let result = match self.next_response() {
            MockResponse::Success { content, usage } => Ok(Completion {
                content,
                model: self.descriptor.resolve_model(options.model.as_deref())?,
                provider_id: self.descriptor.id.clone(),
                usage: Some(usage),
                finish_reason: FinishReason::Stop,
                latency_ms: started.elapsed().as_millis() as u64,
                placeholder: false,
            }),
            MockResponse::Error(err) => Err(err),
        };
        self.health
            .observe(&result, started.elapsed().as_millis() as u64);
        result
    }
}
