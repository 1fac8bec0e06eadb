//! Orchestration engine - the real `AssistantEngine`.
//!
//! Per request: resolve the thread, take a due checkpoint, enhance the
//! prompt with recent history, call the active provider under the retry
//! policy (falling back to other ready providers when allowed), then record
//! the interaction and update session metrics. Persistence problems never
//! fail a request; only an exhausted provider budget does.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

use super::context_manager::ContextManager;
use super::prompts;
use super::registry::ProviderRegistry;
use super::retry::RetryPolicy;
use super::thread_store::ConversationStore;
use crate::config::OrchestrationConfig;
use crate::domain::conversation::{
    ContextType, ContextWindow, Interaction, InteractionDraft, SessionMetrics, ThreadMetadata,
};
use crate::domain::foundation::{InteractionId, ThreadId};
use crate::ports::{
    AssistantEngine, ChatReply, CheckpointOutcome, CommandContext, CommandHelp, Completion,
    CompletionOptions, CompletionOutcome, DebugInfo, EngineError, HealthReport, NewThreadOutcome,
    RequestOptions, SwitchOutcome, TelemetryEvent, TelemetrySink, TimeTravelOutcome,
};

const HEALTH_CHECK_PROMPT: &str = "Health check test";
const HEALTH_CHECK_MAX_TOKENS: u32 = 10;

/// Engine behavior derived from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub enable_fallback: bool,
    pub persistence_enabled: bool,
    pub time_travel_enabled: bool,
}

impl EngineSettings {
    pub fn from_config(config: &OrchestrationConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            enable_fallback: config.enable_fallback,
            persistence_enabled: config.enable_persistence,
            time_travel_enabled: config.time_travel_enabled(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&OrchestrationConfig::default())
    }
}

#[derive(Default)]
struct Session {
    current_thread: Option<ThreadId>,
    metrics: HashMap<ThreadId, SessionMetrics>,
}

pub struct OrchestrationEngine {
    registry: Arc<ProviderRegistry>,
    store: Arc<ConversationStore>,
    context: ContextManager,
    retry: RetryPolicy,
    telemetry: Arc<dyn TelemetrySink>,
    settings: EngineSettings,
    session: RwLock<Session>,
    /// Serializes lazy creation of the first thread.
    thread_init: Mutex<()>,
}

impl OrchestrationEngine {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        store: Arc<ConversationStore>,
        window: ContextWindow,
        retry: RetryPolicy,
        telemetry: Arc<dyn TelemetrySink>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            context: ContextManager::new(store.clone(), window),
            registry,
            store,
            retry,
            telemetry,
            settings,
            session: RwLock::new(Session::default()),
            thread_init: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn current_thread(&self) -> Option<ThreadId> {
        self.session.read().await.current_thread
    }

    /// Working metrics for a thread, restored from storage on first use.
    pub async fn metrics_for(&self, thread_id: ThreadId) -> SessionMetrics {
        if let Some(metrics) = self.session.read().await.metrics.get(&thread_id) {
            return metrics.clone();
        }
        let restored = self.store.restore_metrics(thread_id).await;
        self.session
            .write()
            .await
            .metrics
            .entry(thread_id)
            .or_insert(restored)
            .clone()
    }

    async fn update_metrics(
        &self,
        thread_id: ThreadId,
        update: impl FnOnce(&mut SessionMetrics),
    ) -> SessionMetrics {
        let mut session = self.session.write().await;
        let metrics = session.metrics.entry(thread_id).or_default();
        update(metrics);
        metrics.clone()
    }

    async fn resolve_thread(&self, requested: Option<ThreadId>) -> Result<ThreadId, EngineError> {
        if let Some(thread_id) = requested {
            self.store.ensure_loaded(thread_id).await?;
            return Ok(thread_id);
        }
        if let Some(current) = self.current_thread().await {
            return Ok(current);
        }

        let _init = self.thread_init.lock().await;
        if let Some(current) = self.current_thread().await {
            return Ok(current);
        }
        let created = self.store.new_thread(ThreadMetadata::new()).await;
        let thread_id = *self
            .session
            .write()
            .await
            .current_thread
            .get_or_insert(created);
        self.store.activate(thread_id).await?;
        Ok(thread_id)
    }

    /// Takes an interval checkpoint if one is due; returns current metrics.
    async fn interval_checkpoint(&self, thread_id: ThreadId) -> SessionMetrics {
        let metrics = self.metrics_for(thread_id).await;
        match self
            .store
            .maybe_interval_checkpoint(thread_id, &metrics)
            .await
        {
            Ok(Some(_)) => {
                self.update_metrics(thread_id, SessionMetrics::record_checkpoint)
                    .await
            }
            Ok(None) => metrics,
            Err(_) => {
                self.update_metrics(thread_id, SessionMetrics::record_persistence_error)
                    .await
            }
        }
    }

    fn call_options(&self, options: &RequestOptions) -> CompletionOptions {
        let call = CompletionOptions::new(
            options.temperature.unwrap_or(self.settings.temperature),
            options.max_tokens.unwrap_or(self.settings.max_tokens),
            self.retry.attempt_timeout,
        );
        match &options.model {
            Some(model) => call.with_model(model.clone()),
            None => call,
        }
    }

    /// Active provider under the retry policy, then one attempt on each
    /// other ready provider if the failure was transient. The whole chain
    /// shares the retry policy's overall deadline.
    async fn complete_with_fallback(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, EngineError> {
        let chain = if self.settings.enable_fallback {
            self.registry.fallback_chain().await
        } else {
            self.registry.active().await.into_iter().collect()
        };
        let Some((primary, rest)) = chain.split_first() else {
            return Err(EngineError::NoActiveProvider);
        };
        let primary_id = primary.id().clone();
        let deadline = tokio::time::Instant::now() + self.retry.overall_deadline();

        let result = self
            .retry
            .run_until(
                deadline,
                |_| primary.complete(prompt, options),
                |attempt, error| {
                    tracing::warn!(
                        provider = %primary_id,
                        attempt = attempt + 1,
                        retryable = error.is_retryable(),
                        error = %error,
                        "Provider attempt failed"
                    );
                    self.telemetry
                        .record(TelemetryEvent::provider_failed(&primary_id, attempt + 1, error));
                },
            )
            .await;

        let failure = match result {
            Ok((completion, attempts)) => {
                tracing::debug!(provider = %primary_id, attempts, "Completion succeeded");
                return Ok(completion);
            }
            Err(failure) => failure,
        };

        let mut fallback_attempts = 0u32;
        if failure.error.is_retryable() {
            let fallback_options = CompletionOptions {
                model: None,
                ..options.clone()
            };
            for next in rest {
                if deadline <= tokio::time::Instant::now() {
                    tracing::warn!(provider = %primary_id, "Deadline reached before fallback");
                    break;
                }
                tracing::warn!(
                    from = %primary_id,
                    to = %next.id(),
                    error = %failure.error,
                    "Falling back to next ready provider"
                );
                self.telemetry.record(TelemetryEvent::provider_fallback(
                    &primary_id,
                    next.id(),
                    failure.error.to_string(),
                ));
                fallback_attempts += 1;
                match self
                    .retry
                    .once_until(deadline, next.complete(prompt, &fallback_options))
                    .await
                {
                    Ok(completion) => return Ok(completion),
                    Err(e) => {
                        self.telemetry
                            .record(TelemetryEvent::provider_failed(next.id(), 1, &e));
                    }
                }
            }
        }

        Err(EngineError::Completion {
            provider: primary_id,
            attempts: failure.attempts,
            fallback_attempts,
            source: failure.error,
        })
    }

    async fn command_help(
        &self,
        prompt: String,
        context_type: ContextType,
        max_tokens: u32,
    ) -> Result<CommandHelp, EngineError> {
        let outcome = self
            .generate_completion(
                &prompt,
                RequestOptions::for_context(context_type).with_max_tokens(max_tokens),
            )
            .await?;
        Ok(CommandHelp {
            content: outcome.completion.content,
            provider: outcome.completion.provider_id,
            fallback_mode: false,
        })
    }
}

#[async_trait]
impl AssistantEngine for OrchestrationEngine {
    fn is_fallback(&self) -> bool {
        false
    }

    async fn generate_completion(
        &self,
        prompt: &str,
        options: RequestOptions,
    ) -> Result<CompletionOutcome, EngineError> {
        if prompt.trim().is_empty() {
            return Err(EngineError::InvalidRequest(
                "prompt must not be empty".to_string(),
            ));
        }
        let thread_id = self.resolve_thread(options.thread_id).await?;

        // Catches up on a checkpoint that an earlier failure left missing.
        self.interval_checkpoint(thread_id).await;

        let enhanced = self
            .context
            .build_prompt(prompt, options.context_type, thread_id)
            .await;
        let call_options = self.call_options(&options);

        let started = Instant::now();
        let result = self.complete_with_fallback(&enhanced.text, &call_options).await;
        let response_time_ms = started.elapsed().as_millis() as u64;

        let completion = match result {
            Ok(completion) => completion,
            Err(err) => {
                self.update_metrics(thread_id, SessionMetrics::record_error)
                    .await;
                self.store.recover(thread_id).await;
                tracing::error!(thread_id = %thread_id, error = %err, "Completion failed");
                return Err(err);
            }
        };

        let appended = self
            .store
            .append_interaction(
                thread_id,
                InteractionDraft {
                    prompt: prompt.to_string(),
                    response: completion.content.clone(),
                    provider_id: completion.provider_id.clone(),
                    model: completion.model.clone(),
                    context_snapshot: enhanced.snapshot,
                    duration_ms: response_time_ms,
                    usage: completion.usage,
                },
            )
            .await?;
        let persisted = appended.persisted;
        self.update_metrics(thread_id, |m| {
            m.record_interaction(response_time_ms);
            if !persisted {
                m.record_persistence_error();
            }
        })
        .await;
        let session_metrics = self.interval_checkpoint(thread_id).await;

        let usage = completion.usage.unwrap_or_default();
        self.telemetry.record(TelemetryEvent::CompletionRecorded {
            provider: completion.provider_id.clone(),
            model: completion.model.clone(),
            thread_id,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            response_time_ms,
            occurred_at: appended.interaction.timestamp,
        });

        Ok(CompletionOutcome {
            completion,
            thread_id: Some(thread_id),
            interaction_id: Some(appended.interaction.id),
            session_metrics,
            response_time_ms,
            checkpoint_available: self.settings.time_travel_enabled && persisted,
            fallback_mode: false,
        })
    }

    async fn chat(
        &self,
        message: &str,
        conversation_id: Option<ThreadId>,
    ) -> Result<ChatReply, EngineError> {
        let outcome = self
            .generate_completion(
                message,
                RequestOptions::for_context(ContextType::Chat).on_thread(conversation_id),
            )
            .await?;
        Ok(ChatReply {
            response: outcome.completion.content,
            conversation_id: outcome.thread_id,
            thread_id: outcome.thread_id,
            provider: outcome.completion.provider_id,
            fallback_mode: false,
        })
    }

    async fn explain_command(
        &self,
        command: &str,
        context: &CommandContext,
    ) -> Result<CommandHelp, EngineError> {
        self.command_help(
            prompts::explain_command(command, context),
            ContextType::CommandExplanation,
            prompts::EXPLAIN_MAX_TOKENS,
        )
        .await
    }

    async fn suggest_command(
        &self,
        description: &str,
        context: &CommandContext,
    ) -> Result<CommandHelp, EngineError> {
        self.command_help(
            prompts::suggest_command(description, context),
            ContextType::CommandSuggestion,
            prompts::SUGGEST_MAX_TOKENS,
        )
        .await
    }

    async fn create_new_thread(
        &self,
        metadata: ThreadMetadata,
    ) -> Result<NewThreadOutcome, EngineError> {
        let new_thread_id = self.store.new_thread(metadata).await;
        let previous_thread_id = self.current_thread().await;

        if let Some(previous) = previous_thread_id {
            let metrics = self.metrics_for(previous).await;
            self.store.suspend(previous, &metrics).await;
        }
        self.store.activate(new_thread_id).await?;

        {
            let mut session = self.session.write().await;
            if let Some(previous) = previous_thread_id {
                session.metrics.remove(&previous);
            }
            session.current_thread = Some(new_thread_id);
            session
                .metrics
                .insert(new_thread_id, SessionMetrics::default());
        }
        Ok(NewThreadOutcome {
            new_thread_id,
            previous_thread_id,
        })
    }

    async fn switch_thread(&self, thread_id: ThreadId) -> Result<SwitchOutcome, EngineError> {
        self.store.ensure_loaded(thread_id).await?;
        let previous_thread = self.current_thread().await;
        if previous_thread == Some(thread_id) {
            return Ok(SwitchOutcome {
                previous_thread,
                current_thread: thread_id,
            });
        }

        if let Some(previous) = previous_thread {
            let metrics = self.metrics_for(previous).await;
            self.store.suspend(previous, &metrics).await;
        }
        self.store.activate(thread_id).await?;
        let restored = self.store.restore_metrics(thread_id).await;

        {
            let mut session = self.session.write().await;
            if let Some(previous) = previous_thread {
                session.metrics.remove(&previous);
            }
            session.current_thread = Some(thread_id);
            session.metrics.insert(thread_id, restored);
        }
        tracing::info!(
            from = ?previous_thread,
            to = %thread_id,
            "Switched thread"
        );
        Ok(SwitchOutcome {
            previous_thread,
            current_thread: thread_id,
        })
    }

    async fn list_threads(&self) -> Result<Vec<ThreadId>, EngineError> {
        Ok(self.store.list_threads().await)
    }

    async fn conversation_history(&self, limit: usize) -> Result<Vec<Interaction>, EngineError> {
        match self.current_thread().await {
            Some(thread_id) => Ok(self.store.history(thread_id, limit).await?),
            None => Ok(Vec::new()),
        }
    }

    async fn time_travel(
        &self,
        interaction_id: InteractionId,
    ) -> Result<TimeTravelOutcome, EngineError> {
        if !self.settings.time_travel_enabled {
            return Err(EngineError::TimeTravelDisabled);
        }
        let thread_id = self
            .current_thread()
            .await
            .ok_or_else(|| EngineError::InvalidRequest("no current thread".to_string()))?;

        let metrics = self.metrics_for(thread_id).await;
        let rewound = self
            .store
            .time_travel(thread_id, interaction_id, &metrics)
            .await?;
        let session_metrics = rewound.checkpoint.payload.session_metrics.clone();
        self.session
            .write()
            .await
            .metrics
            .insert(thread_id, session_metrics.clone());

        Ok(TimeTravelOutcome {
            thread_id,
            restored_to: interaction_id,
            timestamp: rewound.interaction_timestamp,
            session_metrics,
        })
    }

    async fn create_checkpoint(
        &self,
        metadata: Map<String, Value>,
    ) -> Result<CheckpointOutcome, EngineError> {
        let Some(thread_id) = self.current_thread().await else {
            tracing::warn!("Checkpoint skipped: no current thread");
            return Ok(CheckpointOutcome::Skipped {
                reason: "no current thread".to_string(),
            });
        };
        let metrics = self.metrics_for(thread_id).await;
        let outcome = self
            .store
            .create_checkpoint(thread_id, metadata, &metrics)
            .await?;
        if matches!(outcome, CheckpointOutcome::Created { .. }) {
            self.update_metrics(thread_id, SessionMetrics::record_checkpoint)
                .await;
        }
        Ok(outcome)
    }

    async fn debug_info(&self) -> DebugInfo {
        let current_thread = self.current_thread().await;
        let session_metrics = match current_thread {
            Some(thread_id) => self.metrics_for(thread_id).await,
            None => SessionMetrics::default(),
        };
        DebugInfo {
            current_thread,
            fallback_mode: false,
            fallback_reason: None,
            session_metrics,
            provider_statuses: self.registry.statuses().await,
            active_provider: self.registry.active_id().await,
            persistence_backend: Some(self.store.backend_name().to_string()),
            persistence_enabled: self.settings.persistence_enabled,
            time_travel_enabled: self.settings.time_travel_enabled,
        }
    }

    async fn health_check(&self) -> HealthReport {
        let current_thread = self.current_thread().await;
        let Some(provider) = self.registry.active().await else {
            return HealthReport {
                healthy: false,
                provider: None,
                latency_ms: None,
                error: Some(EngineError::NoActiveProvider.to_string()),
                fallback_mode: false,
                current_thread,
            };
        };

        let options = CompletionOptions::new(
            self.settings.temperature,
            HEALTH_CHECK_MAX_TOKENS,
            self.retry.attempt_timeout,
        );
        let started = Instant::now();
        let result = self
            .retry
            .once(provider.complete(HEALTH_CHECK_PROMPT, &options))
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthReport {
                healthy: true,
                provider: Some(provider.id().clone()),
                latency_ms: Some(latency_ms),
                error: None,
                fallback_mode: false,
                current_thread,
            },
            Err(e) => {
                tracing::warn!(provider = %provider.id(), error = %e, "Health check failed");
                HealthReport {
                    healthy: false,
                    provider: Some(provider.id().clone()),
                    latency_ms: Some(latency_ms),
                    error: Some(e.to_string()),
                    fallback_mode: false,
                    current_thread,
                }
            }
        }
    }
}
