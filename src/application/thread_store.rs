//! Conversation store - threads, interactions and checkpoints.
//!
//! Wraps an unreliable [`PersistenceBackend`] and keeps a bounded working
//! cache per thread. Backend failures are logged, reported as telemetry and
//! absorbed; only unknown threads or interactions surface as errors.
//!
//! Interaction ids are assigned under the cache write lock, so they are
//! contiguous and strictly increasing per thread. The lock is never held
//! across a backend call.
//!
//! Interactions whose write failed stay in the cache, and reads merge them
//! with what the backend returns. Idle threads are evicted least recently
//! used first once `thread_cache_limit` is reached; a thread is never evicted
//! while it is active or while the cache holds its only copy of anything.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::errors::StoreError;
use crate::domain::conversation::{
    latest_checkpoint, Checkpoint, CheckpointKind, CheckpointPayload, Interaction,
    InteractionDraft, SessionMetrics, ThreadMetadata, ThreadStatus,
};
use crate::domain::foundation::{InteractionId, StateMachine, ThreadId, Timestamp};
use crate::ports::{
    CheckpointOutcome, Checkpointer, PersistenceBackend, PersistenceError, TelemetryEvent,
    TelemetrySink,
};

/// Store behavior derived from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    pub persistence_enabled: bool,
    pub time_travel_enabled: bool,
    pub checkpoint_interval: u32,
    pub cache_limit: usize,
    pub checkpoint_limit: usize,
    pub thread_cache_limit: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            persistence_enabled: true,
            time_travel_enabled: true,
            checkpoint_interval: 5,
            cache_limit: 100,
            checkpoint_limit: 100,
            thread_cache_limit: 32,
        }
    }
}

/// Result of appending an interaction.
#[derive(Debug, Clone)]
pub struct Appended {
    pub interaction: Interaction,
    /// False when the backend write failed and only the cache has it.
    pub persisted: bool,
}

/// Working state after a time travel.
#[derive(Debug, Clone)]
pub struct Rewound {
    /// `Restore` checkpoint describing the new working state; not persisted.
    pub checkpoint: Checkpoint,
    /// When the interaction travelled to was recorded.
    pub interaction_timestamp: Timestamp,
}

struct ThreadState {
    created_at: Timestamp,
    status: ThreadStatus,
    window: VecDeque<Interaction>,
    next_id: InteractionId,
    /// Latest interaction covered by a metrics-counted checkpoint.
    counted_checkpoint_at: Option<InteractionId>,
    /// Interactions not (yet) accepted by the backend.
    unpersisted: BTreeMap<InteractionId, Interaction>,
    /// False when the thread record itself never reached the backend.
    stored: bool,
    last_used: AtomicU64,
}

impl ThreadState {
    fn fresh(created_at: Timestamp, stored: bool, tick: u64) -> Self {
        Self {
            created_at,
            status: ThreadStatus::Created,
            window: VecDeque::new(),
            next_id: InteractionId::FIRST,
            counted_checkpoint_at: None,
            unpersisted: BTreeMap::new(),
            stored,
            last_used: AtomicU64::new(tick),
        }
    }

    /// Safe to drop: the backend can rebuild everything the cache holds.
    fn is_evictable(&self) -> bool {
        self.status != ThreadStatus::Active && self.stored && self.unpersisted.is_empty()
    }

    fn interaction_count(&self) -> u64 {
        self.next_id.value()
    }

    fn last_id(&self) -> Option<InteractionId> {
        self.next_id.value().checked_sub(1).map(InteractionId::new)
    }
}

pub struct ConversationStore {
    backend: Arc<dyn PersistenceBackend>,
    telemetry: Arc<dyn TelemetrySink>,
    settings: StoreSettings,
    threads: RwLock<HashMap<ThreadId, ThreadState>>,
    clock: AtomicU64,
}

impl ConversationStore {
    pub fn new(
        backend: Arc<dyn PersistenceBackend>,
        telemetry: Arc<dyn TelemetrySink>,
        settings: StoreSettings,
    ) -> Self {
        Self {
            backend,
            telemetry,
            settings,
            threads: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn checkpointer(&self, thread_id: ThreadId) -> Checkpointer {
        Checkpointer::new(self.backend.clone(), thread_id, self.settings.checkpoint_limit)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Caches `state`, evicting idle threads to stay within the limit.
    fn insert_state(
        &self,
        threads: &mut HashMap<ThreadId, ThreadState>,
        thread_id: ThreadId,
        state: ThreadState,
    ) {
        if threads.contains_key(&thread_id) {
            return;
        }
        while threads.len() >= self.settings.thread_cache_limit {
            let victim = threads
                .iter()
                .filter(|(_, s)| s.is_evictable())
                .min_by_key(|(_, s)| s.last_used.load(Ordering::Relaxed))
                .map(|(id, _)| *id);
            let Some(victim) = victim else {
                break;
            };
            threads.remove(&victim);
            tracing::debug!(thread_id = %victim, "Thread evicted from cache");
        }
        threads.insert(thread_id, state);
    }

    fn degraded(&self, operation: &str, thread_id: Option<ThreadId>, error: &PersistenceError) {
        tracing::warn!(
            operation,
            thread_id = ?thread_id,
            backend = self.backend.name(),
            error = %error,
            "Persistence call failed, continuing without it"
        );
        self.telemetry
            .record(TelemetryEvent::persistence_degraded(operation, thread_id, error));
    }

    /// Creates a thread. If the backend is down the thread lives in the
    /// cache only.
    pub async fn new_thread(&self, metadata: ThreadMetadata) -> ThreadId {
        let (thread, stored) = match self.backend.new_thread(metadata.clone()).await {
            Ok(thread) => (thread, true),
            Err(e) => {
                let thread = crate::domain::conversation::Thread::new(metadata);
                self.degraded("new_thread", Some(thread.id), &e);
                (thread, false)
            }
        };
        let state = ThreadState::fresh(thread.created_at, stored, self.tick());
        self.insert_state(&mut *self.threads.write().await, thread.id, state);
        tracing::info!(thread_id = %thread.id, "Thread created");
        thread.id
    }

    /// Makes sure the thread is cached, loading it from the backend if needed.
    pub async fn ensure_loaded(&self, thread_id: ThreadId) -> Result<(), StoreError> {
        if let Some(state) = self.threads.read().await.get(&thread_id) {
            state.last_used.store(self.tick(), Ordering::Relaxed);
            return Ok(());
        }

        let thread = self
            .backend
            .load_thread(thread_id)
            .await?
            .ok_or(StoreError::ThreadNotFound(thread_id))?;
        let window = self
            .backend
            .interactions(thread_id, Some(self.settings.cache_limit))
            .await?;
        let checkpoints = match self.backend.checkpoint_history(thread_id).await {
            Ok(cps) => cps,
            Err(e) => {
                self.degraded("checkpoint_history", Some(thread_id), &e);
                Vec::new()
            }
        };

        let mut state = ThreadState::fresh(thread.created_at, true, self.tick());
        if let Some(last) = window.last() {
            state.next_id = last.id.next();
            state.status = ThreadStatus::Suspended;
        }
        state.counted_checkpoint_at = checkpoints
            .iter()
            .filter(|c| c.kind.counts_toward_metrics())
            .map(|c| c.interaction_id)
            .max();
        state.window = window.into();

        self.insert_state(&mut *self.threads.write().await, thread_id, state);
        tracing::debug!(thread_id = %thread_id, "Thread loaded from storage");
        Ok(())
    }

    pub async fn status(&self, thread_id: ThreadId) -> Option<ThreadStatus> {
        self.threads.read().await.get(&thread_id).map(|s| s.status)
    }

    /// Interactions recorded so far (including ones only in the cache).
    pub async fn interaction_count(&self, thread_id: ThreadId) -> u64 {
        self.threads
            .read()
            .await
            .get(&thread_id)
            .map_or(0, ThreadState::interaction_count)
    }

    /// Marks a thread active. Already-active threads are left alone.
    pub async fn activate(&self, thread_id: ThreadId) -> Result<(), StoreError> {
        self.ensure_loaded(thread_id).await?;
        let mut threads = self.threads.write().await;
        let state = threads
            .get_mut(&thread_id)
            .ok_or(StoreError::ThreadNotFound(thread_id))?;
        if state.status != ThreadStatus::Active {
            if let Ok(next) = state.status.transition_to(ThreadStatus::Active) {
                state.status = next;
            }
        }
        Ok(())
    }

    /// Suspends a thread, recording its exact working metrics so a later
    /// switch back can restore them.
    pub async fn suspend(&self, thread_id: ThreadId, metrics: &SessionMetrics) {
        let last_id = {
            let mut threads = self.threads.write().await;
            let Some(state) = threads.get_mut(&thread_id) else {
                return;
            };
            if let Ok(next) = state.status.transition_to(ThreadStatus::Suspended) {
                state.status = next;
            }
            state.last_id()
        };

        let Some(last_id) = last_id else {
            return;
        };
        let checkpoint = Checkpoint::new(
            thread_id,
            last_id,
            CheckpointKind::Suspend,
            CheckpointPayload::new(last_id.value() + 1, metrics.clone()),
        );
        if let Err(e) = self.checkpointer(thread_id).put_checkpoint(&checkpoint).await {
            self.degraded("suspend_checkpoint", Some(thread_id), &e);
        }
    }

    /// Every known thread id: stored threads in creation order, then any
    /// cache-only threads.
    pub async fn list_threads(&self) -> Vec<ThreadId> {
        let mut ids: Vec<ThreadId> = match self.backend.list_threads().await {
            Ok(threads) => threads.into_iter().map(|t| t.id).collect(),
            Err(e) => {
                self.degraded("list_threads", None, &e);
                Vec::new()
            }
        };

        let threads = self.threads.read().await;
        let mut cache_only: Vec<(Timestamp, ThreadId)> = threads
            .iter()
            .filter(|(id, _)| !ids.contains(*id))
            .map(|(id, state)| (state.created_at, *id))
            .collect();
        cache_only.sort();
        ids.extend(cache_only.into_iter().map(|(_, id)| id));
        ids
    }

    /// Appends an interaction. The write to the backend is best-effort.
    pub async fn append_interaction(
        &self,
        thread_id: ThreadId,
        draft: InteractionDraft,
    ) -> Result<Appended, StoreError> {
        self.ensure_loaded(thread_id).await?;
        let interaction = {
            let mut threads = self.threads.write().await;
            let state = threads
                .get_mut(&thread_id)
                .ok_or(StoreError::ThreadNotFound(thread_id))?;
            let interaction = Interaction::record(state.next_id, thread_id, draft);
            state.next_id = state.next_id.next();
            state.window.push_back(interaction.clone());
            while state.window.len() > self.settings.cache_limit {
                state.window.pop_front();
            }
            // Pinned until the backend accepts it.
            state.unpersisted.insert(interaction.id, interaction.clone());
            interaction
        };

        let persisted = match self.checkpointer(thread_id).put(&interaction).await {
            Ok(()) => {
                if let Some(state) = self.threads.write().await.get_mut(&thread_id) {
                    state.unpersisted.remove(&interaction.id);
                }
                true
            }
            Err(e) => {
                self.degraded("put_interaction", Some(thread_id), &e);
                false
            }
        };
        Ok(Appended {
            interaction,
            persisted,
        })
    }

    /// The last `k` interactions of the working window, oldest first.
    /// Unknown threads yield an empty slice.
    pub async fn working_window(&self, thread_id: ThreadId, k: usize) -> Vec<Interaction> {
        let threads = self.threads.read().await;
        let Some(state) = threads.get(&thread_id) else {
            return Vec::new();
        };
        let start = state.window.len().saturating_sub(k);
        state.window.iter().skip(start).cloned().collect()
    }

    /// Stored interactions merged with the cached ones, deduplicated by id,
    /// oldest first, keeping the last `limit` when given. An unreadable
    /// backend leaves just the cache.
    async fn merged_interactions(
        &self,
        thread_id: ThreadId,
        limit: Option<usize>,
    ) -> Vec<Interaction> {
        let stored = match self.backend.interactions(thread_id, limit).await {
            Ok(stored) => stored,
            Err(e) => {
                self.degraded("interactions", Some(thread_id), &e);
                Vec::new()
            }
        };

        let mut by_id: BTreeMap<InteractionId, Interaction> =
            stored.into_iter().map(|i| (i.id, i)).collect();
        if let Some(state) = self.threads.read().await.get(&thread_id) {
            for interaction in state.window.iter().chain(state.unpersisted.values()) {
                by_id
                    .entry(interaction.id)
                    .or_insert_with(|| interaction.clone());
            }
        }

        let mut merged: Vec<Interaction> = by_id.into_values().collect();
        if let Some(limit) = limit {
            let excess = merged.len().saturating_sub(limit);
            merged.drain(..excess);
        }
        merged
    }

    /// Full history, oldest first, including interactions the backend
    /// missed during an outage.
    pub async fn history(
        &self,
        thread_id: ThreadId,
        limit: usize,
    ) -> Result<Vec<Interaction>, StoreError> {
        self.ensure_loaded(thread_id).await?;
        Ok(self.merged_interactions(thread_id, Some(limit)).await)
    }

    async fn write_checkpoint(
        &self,
        thread_id: ThreadId,
        kind: CheckpointKind,
        metadata: Map<String, Value>,
        metrics: &SessionMetrics,
    ) -> Result<Option<Checkpoint>, PersistenceError> {
        let Some(last_id) = self.threads.read().await.get(&thread_id).and_then(ThreadState::last_id)
        else {
            return Ok(None);
        };

        let mut snapshot = metrics.clone();
        if kind.counts_toward_metrics() {
            snapshot.record_checkpoint();
        }
        let checkpoint = Checkpoint::new(
            thread_id,
            last_id,
            kind,
            CheckpointPayload::new(last_id.value() + 1, snapshot).with_metadata(metadata),
        );

        if let Err(e) = self.checkpointer(thread_id).put_checkpoint(&checkpoint).await {
            tracing::warn!(
                thread_id = %thread_id,
                kind = kind.as_str(),
                error = %e,
                "Checkpoint failed"
            );
            self.telemetry
                .record(TelemetryEvent::checkpoint_failed(thread_id, e.to_string()));
            return Err(e);
        }

        if kind.counts_toward_metrics() {
            if let Some(state) = self.threads.write().await.get_mut(&thread_id) {
                state.counted_checkpoint_at = state.counted_checkpoint_at.max(Some(last_id));
            }
        }
        tracing::debug!(
            thread_id = %thread_id,
            interaction_id = %last_id,
            kind = kind.as_str(),
            "Checkpoint created"
        );
        Ok(Some(checkpoint))
    }

    /// Takes an interval checkpoint when one is due.
    ///
    /// Due means checkpointing is enabled, the interaction count is a
    /// positive multiple of the interval, and no counted checkpoint covers
    /// the latest interaction yet. Calling it again before the next append
    /// is a no-op once the checkpoint exists, so a failed attempt is caught
    /// up on the following call.
    pub async fn maybe_interval_checkpoint(
        &self,
        thread_id: ThreadId,
        metrics: &SessionMetrics,
    ) -> Result<Option<Checkpoint>, PersistenceError> {
        if !self.settings.persistence_enabled {
            return Ok(None);
        }
        let due = {
            let threads = self.threads.read().await;
            let Some(state) = threads.get(&thread_id) else {
                return Ok(None);
            };
            let count = state.interaction_count();
            let interval = u64::from(self.settings.checkpoint_interval.max(1));
            count > 0
                && count % interval == 0
                && state.counted_checkpoint_at < state.last_id()
        };
        if !due {
            return Ok(None);
        }
        self.write_checkpoint(thread_id, CheckpointKind::Interval, Map::new(), metrics)
            .await
    }

    /// Manual checkpoint of the thread's latest interaction.
    ///
    /// Never fails because of storage: disabled persistence, an empty thread
    /// or a failed write are reported as `Skipped`.
    pub async fn create_checkpoint(
        &self,
        thread_id: ThreadId,
        metadata: Map<String, Value>,
        metrics: &SessionMetrics,
    ) -> Result<CheckpointOutcome, StoreError> {
        self.ensure_loaded(thread_id).await?;
        if !self.settings.persistence_enabled {
            tracing::warn!(thread_id = %thread_id, "Checkpoint skipped: persistence disabled");
            return Ok(CheckpointOutcome::Skipped {
                reason: "persistence is disabled".to_string(),
            });
        }
        match self
            .write_checkpoint(thread_id, CheckpointKind::Manual, metadata, metrics)
            .await
        {
            Ok(Some(cp)) => Ok(CheckpointOutcome::Created {
                checkpoint_id: cp.id,
                interaction_id: cp.interaction_id,
            }),
            Ok(None) => {
                tracing::warn!(thread_id = %thread_id, "Checkpoint skipped: no interactions yet");
                Ok(CheckpointOutcome::Skipped {
                    reason: "thread has no interactions".to_string(),
                })
            }
            Err(e) => Ok(CheckpointOutcome::Skipped {
                reason: format!("checkpoint write failed: {}", e),
            }),
        }
    }

    /// Rewinds working state to `interaction_id` without deleting anything.
    ///
    /// Takes a best-effort `BeforeTimeTravel` checkpoint, truncates the
    /// working window to interactions up to and including the target, and
    /// derives the session metrics as of that interaction. New interactions
    /// keep numbering after the latest stored id.
    pub async fn time_travel(
        &self,
        thread_id: ThreadId,
        interaction_id: InteractionId,
        metrics: &SessionMetrics,
    ) -> Result<Rewound, StoreError> {
        if !self.settings.time_travel_enabled {
            return Err(StoreError::TimeTravelDisabled);
        }
        self.ensure_loaded(thread_id).await?;

        let interactions = self.merged_interactions(thread_id, None).await;
        let position = interactions
            .iter()
            .position(|i| i.id == interaction_id)
            .ok_or(StoreError::InteractionNotFound {
                thread_id,
                interaction_id,
            })?;

        let mut before_metadata = Map::new();
        before_metadata.insert("target".to_string(), Value::from(interaction_id.value()));
        let before = self
            .write_checkpoint(
                thread_id,
                CheckpointKind::BeforeTimeTravel,
                before_metadata,
                metrics,
            )
            .await;

        let checkpoints = match self.backend.checkpoint_history(thread_id).await {
            Ok(cps) => cps,
            Err(e) => {
                self.degraded("checkpoint_history", Some(thread_id), &e);
                before.ok().flatten().into_iter().collect()
            }
        };
        let kept = &interactions[..=position];
        let relevant: Vec<Checkpoint> = checkpoints
            .into_iter()
            .filter(|c| c.interaction_id <= interaction_id)
            .collect();
        let derived = SessionMetrics::derive(kept, &relevant);

        {
            let mut threads = self.threads.write().await;
            if let Some(state) = threads.get_mut(&thread_id) {
                let start = kept.len().saturating_sub(self.settings.cache_limit);
                state.window = kept[start..].iter().cloned().collect();
            }
        }

        let target = &interactions[position];
        tracing::info!(
            thread_id = %thread_id,
            interaction_id = %interaction_id,
            "Time travel complete"
        );
        Ok(Rewound {
            checkpoint: Checkpoint::new(
                thread_id,
                interaction_id,
                CheckpointKind::Restore,
                CheckpointPayload::new(interaction_id.value() + 1, derived),
            ),
            interaction_timestamp: target.timestamp,
        })
    }

    /// Session metrics for a thread being resumed, rebuilt from storage.
    pub async fn restore_metrics(&self, thread_id: ThreadId) -> SessionMetrics {
        let interactions = self.merged_interactions(thread_id, None).await;
        let checkpoints = match self.backend.checkpoint_history(thread_id).await {
            Ok(cps) => cps,
            Err(e) => {
                self.degraded("checkpoint_history", Some(thread_id), &e);
                Vec::new()
            }
        };
        SessionMetrics::restore(&interactions, &checkpoints)
    }

    /// Best-effort recovery after a failed completion: re-cache the thread
    /// if it was evicted and report its latest checkpoint.
    pub async fn recover(&self, thread_id: ThreadId) -> Option<Checkpoint> {
        if let Err(e) = self.ensure_loaded(thread_id).await {
            tracing::warn!(thread_id = %thread_id, error = %e, "Recovery could not reload thread");
            return None;
        }
        match self.checkpointer(thread_id).get().await {
            Ok(latest) => {
                if let Some(cp) = &latest {
                    tracing::info!(
                        thread_id = %thread_id,
                        checkpoint_id = %cp.id,
                        interaction_id = %cp.interaction_id,
                        "Latest checkpoint available after failure"
                    );
                }
                latest
            }
            Err(e) => {
                self.degraded("checkpoint_get", Some(thread_id), &e);
                None
            }
        }
    }

    /// Latest checkpoint among all stored for the thread.
    pub async fn latest_checkpoint(&self, thread_id: ThreadId) -> Option<Checkpoint> {
        let history = self.backend.checkpoint_history(thread_id).await.ok()?;
        latest_checkpoint(&history).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::InMemoryBackend;
    use crate::adapters::telemetry::RecordingTelemetry;
    use crate::domain::conversation::{ContextSnapshot, ContextType};
    use crate::domain::foundation::ProviderId;

    fn draft(prompt: &str) -> InteractionDraft {
        InteractionDraft {
            prompt: prompt.to_string(),
            response: format!("re: {}", prompt),
            provider_id: ProviderId::from_static("mock"),
            model: "mock-model-1".to_string(),
            context_snapshot: ContextSnapshot::empty(ContextType::General),
            duration_ms: 10,
            usage: None,
        }
    }

    fn store_with(
        settings: StoreSettings,
    ) -> (ConversationStore, Arc<InMemoryBackend>, Arc<RecordingTelemetry>) {
        let backend = Arc::new(InMemoryBackend::new());
        let telemetry = Arc::new(RecordingTelemetry::new());
        let store = ConversationStore::new(backend.clone(), telemetry.clone(), settings);
        (store, backend, telemetry)
    }

    fn interval(n: u32) -> StoreSettings {
        StoreSettings {
            checkpoint_interval: n,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn ids_start_at_zero_and_are_contiguous() {
        let (store, _, _) = store_with(StoreSettings::default());
        let thread = store.new_thread(ThreadMetadata::new()).await;

        for expected in 0..5u64 {
            let appended = store.append_interaction(thread, draft("q")).await.unwrap();
            assert_eq!(appended.interaction.id.value(), expected);
            assert!(appended.persisted);
        }
    }

    #[tokio::test]
    async fn append_to_unknown_thread_is_not_found() {
        let (store, _, _) = store_with(StoreSettings::default());
        let unknown = ThreadId::new();
        let err = store.append_interaction(unknown, draft("q")).await.unwrap_err();
        assert_eq!(err, StoreError::ThreadNotFound(unknown));
    }

    #[tokio::test]
    async fn interval_checkpoint_is_taken_once() {
        let (store, backend, _) = store_with(interval(2));
        let thread = store.new_thread(ThreadMetadata::new()).await;
        let metrics = SessionMetrics::default();

        store.append_interaction(thread, draft("a")).await.unwrap();
        assert!(store.maybe_interval_checkpoint(thread, &metrics).await.unwrap().is_none());
        store.append_interaction(thread, draft("b")).await.unwrap();
        assert!(store.maybe_interval_checkpoint(thread, &metrics).await.unwrap().is_some());
        // Catch-up check before the next call finds nothing to do.
        assert!(store.maybe_interval_checkpoint(thread, &metrics).await.unwrap().is_none());

        assert_eq!(backend.checkpoint_history(thread).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_interval_checkpoint_is_caught_up() {
        let (store, backend, telemetry) = store_with(interval(1));
        let thread = store.new_thread(ThreadMetadata::new()).await;
        store.append_interaction(thread, draft("a")).await.unwrap();

        backend.set_reachable(false);
        assert!(store
            .maybe_interval_checkpoint(thread, &SessionMetrics::default())
            .await
            .is_err());
        assert!(telemetry.has_event("checkpoint_failed"));

        backend.set_reachable(true);
        assert!(store
            .maybe_interval_checkpoint(thread, &SessionMetrics::default())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn backend_outage_keeps_interaction_in_cache() {
        let (store, backend, telemetry) = store_with(StoreSettings::default());
        let thread = store.new_thread(ThreadMetadata::new()).await;
        backend.set_reachable(false);

        let appended = store.append_interaction(thread, draft("q")).await.unwrap();
        assert!(!appended.persisted);
        assert_eq!(store.working_window(thread, 3).await.len(), 1);
        assert!(telemetry.has_event("persistence_degraded"));
    }

    fn ids(interactions: &[Interaction]) -> Vec<u64> {
        interactions.iter().map(|i| i.id.value()).collect()
    }

    #[tokio::test]
    async fn history_spans_a_storage_outage() {
        let (store, backend, _) = store_with(interval(100));
        let thread = store.new_thread(ThreadMetadata::new()).await;

        assert!(store.append_interaction(thread, draft("a")).await.unwrap().persisted);
        backend.set_reachable(false);
        assert!(!store.append_interaction(thread, draft("b")).await.unwrap().persisted);
        backend.set_reachable(true);
        assert!(store.append_interaction(thread, draft("c")).await.unwrap().persisted);

        assert_eq!(ids(&store.history(thread, 10).await.unwrap()), vec![0, 1, 2]);
        assert_eq!(ids(&store.history(thread, 2).await.unwrap()), vec![1, 2]);

        let rewound = store
            .time_travel(thread, InteractionId::new(1), &SessionMetrics::default())
            .await
            .unwrap();
        assert_eq!(rewound.checkpoint.interaction_id, InteractionId::new(1));
        assert_eq!(rewound.checkpoint.payload.session_metrics.total_interactions, 2);
        assert_eq!(ids(&store.working_window(thread, 10).await), vec![0, 1]);
    }

    #[tokio::test]
    async fn idle_threads_are_evicted_and_reload_on_recover() {
        let (store, _, _) = store_with(StoreSettings {
            thread_cache_limit: 1,
            ..Default::default()
        });
        let first = store.new_thread(ThreadMetadata::new()).await;
        store.append_interaction(first, draft("a")).await.unwrap();
        store
            .create_checkpoint(first, Map::new(), &SessionMetrics::default())
            .await
            .unwrap();

        let second = store.new_thread(ThreadMetadata::new()).await;
        assert_eq!(store.status(first).await, None);
        assert_eq!(store.status(second).await, Some(ThreadStatus::Created));

        let latest = store.recover(first).await.expect("checkpoint after reload");
        assert_eq!(latest.interaction_id, InteractionId::FIRST);
        assert_eq!(store.status(first).await, Some(ThreadStatus::Suspended));
        assert_eq!(store.status(second).await, None);

        // Numbering resumes from storage.
        let next = store.append_interaction(first, draft("b")).await.unwrap();
        assert_eq!(next.interaction.id.value(), 1);
    }

    #[tokio::test]
    async fn active_and_unpersisted_threads_stay_cached() {
        let (store, backend, _) = store_with(StoreSettings {
            thread_cache_limit: 1,
            ..Default::default()
        });
        let active = store.new_thread(ThreadMetadata::new()).await;
        store.activate(active).await.unwrap();
        let pending = store.new_thread(ThreadMetadata::new()).await;
        assert_eq!(store.status(active).await, Some(ThreadStatus::Active));

        backend.set_reachable(false);
        store.append_interaction(pending, draft("a")).await.unwrap();
        backend.set_reachable(true);

        store.new_thread(ThreadMetadata::new()).await;
        assert_eq!(store.status(active).await, Some(ThreadStatus::Active));
        assert_eq!(ids(&store.history(pending, 10).await.unwrap()), vec![0]);
    }

    #[tokio::test]
    async fn manual_checkpoint_needs_an_interaction() {
        let (store, _, _) = store_with(StoreSettings::default());
        let thread = store.new_thread(ThreadMetadata::new()).await;
        let metrics = SessionMetrics::default();

        let outcome = store.create_checkpoint(thread, Map::new(), &metrics).await.unwrap();
        assert!(matches!(outcome, CheckpointOutcome::Skipped { .. }));

        store.append_interaction(thread, draft("a")).await.unwrap();
        let outcome = store.create_checkpoint(thread, Map::new(), &metrics).await.unwrap();
        assert!(matches!(
            outcome,
            CheckpointOutcome::Created { interaction_id, .. } if interaction_id == InteractionId::FIRST
        ));
    }

    #[tokio::test]
    async fn checkpoint_is_skipped_when_persistence_disabled() {
        let (store, _, _) = store_with(StoreSettings {
            persistence_enabled: false,
            time_travel_enabled: false,
            ..Default::default()
        });
        let thread = store.new_thread(ThreadMetadata::new()).await;
        store.append_interaction(thread, draft("a")).await.unwrap();

        let outcome = store
            .create_checkpoint(thread, Map::new(), &SessionMetrics::default())
            .await
            .unwrap();
        assert!(matches!(outcome, CheckpointOutcome::Skipped { .. }));
        assert_eq!(
            store
                .time_travel(thread, InteractionId::FIRST, &SessionMetrics::default())
                .await
                .unwrap_err(),
            StoreError::TimeTravelDisabled
        );
    }

    #[tokio::test]
    async fn time_travel_rewinds_window_but_keeps_history() {
        let (store, _, _) = store_with(interval(100));
        let thread = store.new_thread(ThreadMetadata::new()).await;
        for p in ["a", "b", "c", "d"] {
            store.append_interaction(thread, draft(p)).await.unwrap();
        }

        let rewound = store
            .time_travel(thread, InteractionId::new(1), &SessionMetrics::default())
            .await
            .unwrap();
        assert_eq!(rewound.checkpoint.kind, CheckpointKind::Restore);
        assert_eq!(rewound.checkpoint.payload.session_metrics.total_interactions, 2);

        let window: Vec<u64> = store
            .working_window(thread, 10)
            .await
            .iter()
            .map(|i| i.id.value())
            .collect();
        assert_eq!(window, vec![0, 1]);
        assert_eq!(store.history(thread, 10).await.unwrap().len(), 4);

        // Numbering continues after the latest stored id.
        let next = store.append_interaction(thread, draft("e")).await.unwrap();
        assert_eq!(next.interaction.id.value(), 4);
    }

    #[tokio::test]
    async fn time_travel_to_unknown_interaction_is_not_found() {
        let (store, _, _) = store_with(StoreSettings::default());
        let thread = store.new_thread(ThreadMetadata::new()).await;
        store.append_interaction(thread, draft("a")).await.unwrap();

        let err = store
            .time_travel(thread, InteractionId::new(9), &SessionMetrics::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InteractionNotFound { .. }));
    }

    #[tokio::test]
    async fn suspend_snapshot_restores_exact_metrics() {
        let (store, _, _) = store_with(StoreSettings::default());
        let thread = store.new_thread(ThreadMetadata::new()).await;
        store.activate(thread).await.unwrap();
        store.append_interaction(thread, draft("a")).await.unwrap();

        let mut metrics = SessionMetrics::default();
        metrics.record_interaction(10);
        metrics.record_error();
        store.suspend(thread, &metrics).await;

        assert_eq!(store.status(thread).await, Some(ThreadStatus::Suspended));
        assert_eq!(store.restore_metrics(thread).await, metrics);
    }

    #[tokio::test]
    async fn threads_reload_from_backend_after_restart() {
        let backend = Arc::new(InMemoryBackend::new());
        let telemetry = Arc::new(RecordingTelemetry::new());
        let first = ConversationStore::new(backend.clone(), telemetry.clone(), StoreSettings::default());
        let thread = first.new_thread(ThreadMetadata::new()).await;
        first.append_interaction(thread, draft("a")).await.unwrap();
        first.append_interaction(thread, draft("b")).await.unwrap();

        let second = ConversationStore::new(backend, telemetry, StoreSettings::default());
        assert_eq!(second.list_threads().await, vec![thread]);
        let next = second.append_interaction(thread, draft("c")).await.unwrap();
        assert_eq!(next.interaction.id.value(), 2);
        assert_eq!(second.status(thread).await, Some(ThreadStatus::Suspended));
    }
}
