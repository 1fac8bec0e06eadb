//! In-memory persistence backend.
//!
//! Used for the `memory` backend, for volatile storage when persistence is
//! disabled, and in tests. Reachability can be toggled to simulate an
//! outage.

use async_trait::async_trait;
use secrecy::Secret;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::domain::conversation::{Checkpoint, Interaction, Thread, ThreadMetadata};
use crate::domain::foundation::ThreadId;
use crate::ports::{PersistenceBackend, PersistenceError};

#[derive(Default)]
struct Record {
    thread: Option<Thread>,
    interactions: Vec<Interaction>,
    checkpoints: Vec<Checkpoint>,
}

/// Process-lifetime storage backed by a `HashMap`.
pub struct InMemoryBackend {
    name: &'static str,
    threads: RwLock<HashMap<ThreadId, Record>>,
    order: RwLock<Vec<ThreadId>>,
    reachable: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Backend standing in for disabled persistence.
    pub fn volatile() -> Self {
        Self::named("volatile")
    }

    /// Backend that fails every call until made reachable.
    pub fn unreachable() -> Self {
        let backend = Self::new();
        backend.set_reachable(false);
        backend
    }

    fn named(name: &'static str) -> Self {
        Self {
            name,
            threads: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            reachable: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        }
    }

    /// Simulates an outage (`false`) or recovery (`true`).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Successful writes so far, for test assertions.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn ensure_reachable(&self) -> Result<(), PersistenceError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PersistenceError::unavailable("in-memory backend marked unreachable"))
        }
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn init(&self, _credentials: Option<&Secret<String>>) -> Result<(), PersistenceError> {
        self.ensure_reachable()
    }

    async fn new_thread(&self, metadata: ThreadMetadata) -> Result<Thread, PersistenceError> {
        self.ensure_reachable()?;
        let thread = Thread::new(metadata);
        self.threads.write().await.insert(
            thread.id,
            Record {
                thread: Some(thread.clone()),
                ..Default::default()
            },
        );
        self.order.write().await.push(thread.id);
        self.wrote();
        Ok(thread)
    }

    async fn load_thread(&self, thread_id: ThreadId) -> Result<Option<Thread>, PersistenceError> {
        self.ensure_reachable()?;
        Ok(self
            .threads
            .read()
            .await
            .get(&thread_id)
            .and_then(|r| r.thread.clone()))
    }

    async fn list_threads(&self) -> Result<Vec<Thread>, PersistenceError> {
        self.ensure_reachable()?;
        let threads = self.threads.read().await;
        Ok(self
            .order
            .read()
            .await
            .iter()
            .filter_map(|id| threads.get(id).and_then(|r| r.thread.clone()))
            .collect())
    }

    async fn put_interaction(&self, interaction: &Interaction) -> Result<(), PersistenceError> {
        self.ensure_reachable()?;
        let mut threads = self.threads.write().await;
        let record = threads
            .get_mut(&interaction.thread_id)
            .ok_or_else(|| {
                PersistenceError::write_failed(format!("unknown thread {}", interaction.thread_id))
            })?;
        if record.interactions.iter().any(|i| i.id == interaction.id) {
            return Err(PersistenceError::Duplicate {
                thread_id: interaction.thread_id,
                interaction_id: interaction.id.value(),
            });
        }
        record.interactions.push(interaction.clone());
        self.wrote();
        Ok(())
    }

    async fn interactions(
        &self,
        thread_id: ThreadId,
        limit: Option<usize>,
    ) -> Result<Vec<Interaction>, PersistenceError> {
        self.ensure_reachable()?;
        let threads = self.threads.read().await;
        let all = threads
            .get(&thread_id)
            .map(|r| r.interactions.as_slice())
            .unwrap_or_default();
        let start = limit.map_or(0, |l| all.len().saturating_sub(l));
        Ok(all[start..].to_vec())
    }

    async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), PersistenceError> {
        self.ensure_reachable()?;
        let mut threads = self.threads.write().await;
        let record = threads.get_mut(&checkpoint.thread_id).ok_or_else(|| {
            PersistenceError::write_failed(format!("unknown thread {}", checkpoint.thread_id))
        })?;
        record.checkpoints.push(checkpoint.clone());
        self.wrote();
        Ok(())
    }

    async fn checkpoint_history(
        &self,
        thread_id: ThreadId,
    ) -> Result<Vec<Checkpoint>, PersistenceError> {
        self.ensure_reachable()?;
        Ok(self
            .threads
            .read()
            .await
            .get(&thread_id)
            .map(|r| r.checkpoints.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::{
        CheckpointKind, CheckpointPayload, ContextSnapshot, ContextType, InteractionDraft,
        SessionMetrics,
    };
    use crate::domain::foundation::{InteractionId, ProviderId};

    fn interaction(thread_id: ThreadId, id: u64) -> Interaction {
        Interaction::record(
            InteractionId::new(id),
            thread_id,
            InteractionDraft {
                prompt: format!("q{}", id),
                response: format!("a{}", id),
                provider_id: ProviderId::from_static("mock"),
                model: "mock-model-1".to_string(),
                context_snapshot: ContextSnapshot::empty(ContextType::General),
                duration_ms: 5,
                usage: None,
            },
        )
    }

    #[tokio::test]
    async fn stores_threads_in_creation_order() {
        let backend = InMemoryBackend::new();
        let a = backend.new_thread(ThreadMetadata::new()).await.unwrap();
        let b = backend.new_thread(ThreadMetadata::new()).await.unwrap();

        let listed: Vec<_> = backend.list_threads().await.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(listed, vec![a.id, b.id]);
        assert_eq!(backend.load_thread(a.id).await.unwrap(), Some(a));
        assert_eq!(backend.load_thread(ThreadId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn limited_reads_return_most_recent_oldest_first() {
        let backend = InMemoryBackend::new();
        let thread = backend.new_thread(ThreadMetadata::new()).await.unwrap();
        for i in 0..5 {
            backend.put_interaction(&interaction(thread.id, i)).await.unwrap();
        }

        let ids: Vec<u64> = backend
            .interactions(thread.id, Some(2))
            .await
            .unwrap()
            .iter()
            .map(|i| i.id.value())
            .collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(backend.interactions(thread.id, None).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn rejects_duplicate_interaction_ids() {
        let backend = InMemoryBackend::new();
        let thread = backend.new_thread(ThreadMetadata::new()).await.unwrap();
        backend.put_interaction(&interaction(thread.id, 0)).await.unwrap();

        let err = backend.put_interaction(&interaction(thread.id, 0)).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Duplicate { interaction_id: 0, .. }));
    }

    #[tokio::test]
    async fn unreachable_backend_fails_every_call() {
        let backend = InMemoryBackend::unreachable();
        assert!(backend.init(None).await.is_err());
        assert!(backend.new_thread(ThreadMetadata::new()).await.is_err());

        backend.set_reachable(true);
        assert!(backend.init(None).await.is_ok());
    }

    #[tokio::test]
    async fn checkpoints_round_trip_per_thread() {
        let backend = InMemoryBackend::new();
        let thread = backend.new_thread(ThreadMetadata::new()).await.unwrap();
        let cp = Checkpoint::new(
            thread.id,
            InteractionId::FIRST,
            CheckpointKind::Manual,
            CheckpointPayload::new(1, SessionMetrics::default()),
        );
        backend.put_checkpoint(&cp).await.unwrap();

        assert_eq!(backend.checkpoint_history(thread.id).await.unwrap(), vec![cp]);
        assert!(backend.checkpoint_history(ThreadId::new()).await.unwrap().is_empty());
    }
}
