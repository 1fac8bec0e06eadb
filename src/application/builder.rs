//! Wires configuration, adapters and policies into an `OrchestrationEngine`.

use std::sync::Arc;

use super::engine::{EngineSettings, OrchestrationEngine};
use super::registry::ProviderRegistry;
use super::retry::RetryPolicy;
use super::thread_store::{ConversationStore, StoreSettings};
use crate::adapters::ai::build_providers;
use crate::adapters::persistence::{build_backend, InMemoryBackend};
use crate::adapters::telemetry::TracingTelemetry;
use crate::config::{EngineConfig, ValidationError};
use crate::domain::conversation::ContextWindow;
use crate::domain::foundation::ProviderId;
use crate::ports::{PersistenceBackend, PersistenceError, ProviderAdapter, TelemetrySink};

/// Why an engine could not be constructed.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),

    #[error("persistence backend unavailable: {0}")]
    Persistence(#[from] PersistenceError),
}

pub struct EngineBuilder {
    config: EngineConfig,
    providers: Option<Vec<Arc<dyn ProviderAdapter>>>,
    backend: Option<Arc<dyn PersistenceBackend>>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            providers: None,
            backend: None,
            telemetry: Arc::new(TracingTelemetry),
        }
    }

    /// Replaces the providers built from `ProvidersConfig`.
    pub fn with_providers(mut self, providers: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Replaces the backend selected by `PersistenceConfig`.
    pub fn with_backend(mut self, backend: Arc<dyn PersistenceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn telemetry(&self) -> Arc<dyn TelemetrySink> {
        self.telemetry.clone()
    }

    /// Validates configuration, initializes the backend and every provider,
    /// and activates the preferred provider when it is ready.
    pub async fn build(self) -> Result<OrchestrationEngine, BuildError> {
        self.config.validate()?;
        let orchestration = &self.config.orchestration;

        let backend: Arc<dyn PersistenceBackend> = if orchestration.enable_persistence {
            self.backend
                .unwrap_or_else(|| build_backend(&self.config.persistence))
        } else {
            Arc::new(InMemoryBackend::volatile())
        };
        let credentials = self.config.persistence.secret_credentials();
        backend.init(credentials.as_ref()).await?;
        tracing::info!(backend = backend.name(), "Persistence backend ready");

        let registry = Arc::new(ProviderRegistry::new());
        let providers = self
            .providers
            .unwrap_or_else(|| build_providers(&self.config.providers, orchestration.timeout()));
        registry.register_all(providers).await;

        if let Some(preferred) = &orchestration.preferred_provider {
            match ProviderId::new(preferred.as_str()) {
                Ok(id) => {
                    if !registry.prefer(&id).await {
                        tracing::warn!(
                            preferred = %id,
                            active = ?registry.active_id().await,
                            "Preferred provider is not ready"
                        );
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Ignoring invalid preferred provider"),
            }
        }
        if registry.active_id().await.is_none() {
            tracing::warn!("No provider is ready; completions will fail until one is");
        }

        let store = Arc::new(ConversationStore::new(
            backend,
            self.telemetry.clone(),
            StoreSettings {
                persistence_enabled: orchestration.enable_persistence,
                time_travel_enabled: orchestration.time_travel_enabled(),
                checkpoint_interval: orchestration.checkpoint_interval,
                cache_limit: orchestration.history_cache_limit,
                thread_cache_limit: orchestration.thread_cache_limit,
                checkpoint_limit: self.config.persistence.checkpoint_limit,
            },
        ));

        Ok(OrchestrationEngine::new(
            registry,
            store,
            ContextWindow::new(orchestration.context_window),
            RetryPolicy::from_config(orchestration),
            self.telemetry,
            EngineSettings::from_config(orchestration),
        ))
    }
}
