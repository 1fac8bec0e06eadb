//! Provider registry - coordinates which adapter serves requests.
//!
//! The registry performs no network calls of its own beyond asking adapters
//! to initialize when they are registered. The active pointer sits behind an
//! `RwLock`, so readers observe either the old or the new provider.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::errors::RegistryError;
use crate::domain::foundation::ProviderId;
use crate::ports::{ProviderAdapter, ProviderSnapshot, ProviderStatus};

#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<Vec<Arc<dyn ProviderAdapter>>>,
    active: RwLock<Option<ProviderId>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initializes and registers an adapter.
    ///
    /// The first adapter that comes up `Ready` becomes active.
    pub async fn register(&self, adapter: Arc<dyn ProviderAdapter>) -> ProviderStatus {
        let status = initialize(adapter.as_ref()).await;
        self.insert(adapter, status).await;
        status
    }

    /// Initializes adapters concurrently, then registers them in the given
    /// order so "first ready" stays deterministic.
    pub async fn register_all(
        &self,
        adapters: Vec<Arc<dyn ProviderAdapter>>,
    ) -> Vec<(ProviderId, ProviderStatus)> {
        let statuses = join_all(adapters.iter().map(|a| initialize(a.as_ref()))).await;
        let mut registered = Vec::with_capacity(adapters.len());
        for (adapter, status) in adapters.into_iter().zip(statuses) {
            registered.push((adapter.id().clone(), status));
            self.insert(adapter, status).await;
        }
        registered
    }

    async fn insert(&self, adapter: Arc<dyn ProviderAdapter>, status: ProviderStatus) {
        let id = adapter.id().clone();
        {
            let mut providers = self.providers.write().await;
            providers.retain(|p| p.id() != &id);
            providers.push(adapter);
        }
        if status.is_ready() {
            let mut active = self.active.write().await;
            if active.is_none() {
                tracing::info!(provider = %id, "Provider activated");
                *active = Some(id);
            }
        }
    }

    /// Makes a registered provider active regardless of its status.
    pub async fn set_active(&self, id: &ProviderId) -> Result<(), RegistryError> {
        if self.get(id).await.is_none() {
            return Err(RegistryError::NotFound(id.clone()));
        }
        *self.active.write().await = Some(id.clone());
        tracing::info!(provider = %id, "Active provider changed");
        Ok(())
    }

    /// Activates `id` only if it is registered and ready.
    pub async fn prefer(&self, id: &ProviderId) -> bool {
        match self.get(id).await {
            Some(provider) if provider.status().is_ready() => {
                *self.active.write().await = Some(id.clone());
                true
            }
            Some(provider) => {
                tracing::debug!(
                    provider = %id,
                    status = %provider.status(),
                    "Preferred provider not ready, keeping current"
                );
                false
            }
            None => false,
        }
    }

    pub async fn get(&self, id: &ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers
            .read()
            .await
            .iter()
            .find(|p| p.id() == id)
            .cloned()
    }

    pub async fn active_id(&self) -> Option<ProviderId> {
        self.active.read().await.clone()
    }

    pub async fn active(&self) -> Option<Arc<dyn ProviderAdapter>> {
        let id = self.active_id().await?;
        self.get(&id).await
    }

    /// Ready providers in registration order.
    pub async fn list_ready(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        self.providers
            .read()
            .await
            .iter()
            .filter(|p| p.status().is_ready())
            .cloned()
            .collect()
    }

    /// The active provider followed by every other ready provider.
    pub async fn fallback_chain(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        let active = self.active().await;
        let mut chain: Vec<Arc<dyn ProviderAdapter>> = active.iter().cloned().collect();
        for provider in self.list_ready().await {
            if active.as_ref().map_or(true, |a| a.id() != provider.id()) {
                chain.push(provider);
            }
        }
        chain
    }

    pub async fn statuses(&self) -> Vec<ProviderSnapshot> {
        let active = self.active_id().await;
        self.providers
            .read()
            .await
            .iter()
            .map(|p| ProviderSnapshot {
                id: p.id().clone(),
                display_name: p.descriptor().display_name.clone(),
                status: p.status(),
                last_latency_ms: p.last_latency_ms(),
                active: active.as_ref() == Some(p.id()),
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.providers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.providers.read().await.is_empty()
    }
}

async fn initialize(adapter: &dyn ProviderAdapter) -> ProviderStatus {
    match adapter.initialize().await {
        Ok(status) => {
            tracing::debug!(provider = %adapter.id(), status = %status, "Provider initialized");
            status
        }
        Err(e) => {
            tracing::warn!(provider = %adapter.id(), error = %e, "Provider failed to initialize");
            ProviderStatus::Error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::{MockInit, MockProvider};
    use crate::ports::ProviderError;

    fn id(s: &'static str) -> ProviderId {
        ProviderId::from_static(s)
    }

    #[tokio::test]
    async fn first_ready_provider_becomes_active() {
        let registry = ProviderRegistry::new();
        registry
            .register(Arc::new(MockProvider::new("a").with_init(MockInit::MissingCredentials)))
            .await;
        registry.register(Arc::new(MockProvider::new("b"))).await;
        registry.register(Arc::new(MockProvider::new("c"))).await;

        assert_eq!(registry.active_id().await, Some(id("b")));
        assert_eq!(registry.list_ready().await.len(), 2);
    }

    #[tokio::test]
    async fn register_all_keeps_given_order() {
        let registry = ProviderRegistry::new();
        let registered = registry
            .register_all(vec![
                Arc::new(MockProvider::new("x").with_delay(std::time::Duration::from_millis(20))),
                Arc::new(MockProvider::new("y")),
            ])
            .await;

        let ids: Vec<_> = registered.iter().map(|(id, _)| id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["x", "y"]);
        assert_eq!(registry.active_id().await, Some(id("x")));
    }

    #[tokio::test]
    async fn set_active_unknown_is_not_found() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::new("a"))).await;

        assert_eq!(
            registry.set_active(&id("zzz")).await,
            Err(RegistryError::NotFound(id("zzz")))
        );
        assert_eq!(registry.active_id().await, Some(id("a")));
    }

    #[tokio::test]
    async fn set_active_overrides_default() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::new("a"))).await;
        registry.register(Arc::new(MockProvider::new("b"))).await;

        registry.set_active(&id("b")).await.unwrap();
        assert_eq!(registry.active().await.unwrap().id(), &id("b"));
    }

    #[tokio::test]
    async fn prefer_ignores_providers_that_are_not_ready() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::new("a"))).await;
        registry
            .register(Arc::new(
                MockProvider::new("b").with_init(MockInit::Fail(ProviderError::network("down"))),
            ))
            .await;

        assert!(!registry.prefer(&id("b")).await);
        assert!(!registry.prefer(&id("missing")).await);
        assert_eq!(registry.active_id().await, Some(id("a")));
    }

    #[tokio::test]
    async fn fallback_chain_starts_with_active() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::new("a"))).await;
        registry.register(Arc::new(MockProvider::new("b"))).await;
        registry.register(Arc::new(MockProvider::new("c"))).await;
        registry.set_active(&id("b")).await.unwrap();

        let chain: Vec<_> = registry
            .fallback_chain()
            .await
            .iter()
            .map(|p| p.id().as_str().to_string())
            .collect();
        assert_eq!(chain, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn statuses_flag_the_active_provider() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::new("a"))).await;
        registry
            .register(Arc::new(MockProvider::new("b").with_init(MockInit::MissingCredentials)))
            .await;

        let statuses = registry.statuses().await;
        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].active);
        assert_eq!(statuses[1].status, ProviderStatus::MissingCredentials);
        assert!(!statuses[1].active);
    }

    #[tokio::test]
    async fn empty_registry_has_no_active_provider() {
        let registry = ProviderRegistry::new();
        assert!(registry.active().await.is_none());
        assert!(registry.fallback_chain().await.is_empty());
        assert!(registry.is_empty().await);
    }
}
