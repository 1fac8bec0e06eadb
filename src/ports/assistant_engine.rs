//! Assistant Engine Port - Primary port for callers of the engine.
//!
//! Both the real orchestration engine and the degraded fallback engine
//! implement this trait, so callers hold an `Arc<dyn AssistantEngine>` and can
//! only tell them apart through the explicit `fallback_mode` flags.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Completion, PersistenceError, ProviderError, ProviderStatus};
use crate::domain::conversation::{ContextType, Interaction, SessionMetrics, ThreadMetadata};
use crate::domain::foundation::{CheckpointId, InteractionId, ProviderId, ThreadId, Timestamp};

/// Primary port for completion, thread and time-travel operations.
#[async_trait]
pub trait AssistantEngine: Send + Sync {
    /// True for the degraded placeholder engine.
    fn is_fallback(&self) -> bool;

    /// Builds the enhanced prompt, calls a provider with retries and records
    /// the interaction.
    async fn generate_completion(
        &self,
        prompt: &str,
        options: RequestOptions,
    ) -> Result<CompletionOutcome, EngineError>;

    /// Conversational turn, optionally on a specific thread.
    async fn chat(
        &self,
        message: &str,
        conversation_id: Option<ThreadId>,
    ) -> Result<ChatReply, EngineError>;

    /// Explains what a shell command does.
    async fn explain_command(
        &self,
        command: &str,
        context: &CommandContext,
    ) -> Result<CommandHelp, EngineError>;

    /// Suggests a command for a described task.
    async fn suggest_command(
        &self,
        description: &str,
        context: &CommandContext,
    ) -> Result<CommandHelp, EngineError>;

    /// Starts a new thread and makes it current.
    async fn create_new_thread(
        &self,
        metadata: ThreadMetadata,
    ) -> Result<NewThreadOutcome, EngineError>;

    /// Makes an existing thread current.
    async fn switch_thread(&self, thread_id: ThreadId) -> Result<SwitchOutcome, EngineError>;

    /// Every known thread id.
    async fn list_threads(&self) -> Result<Vec<ThreadId>, EngineError>;

    /// Most recent interactions of the current thread, oldest first.
    async fn conversation_history(&self, limit: usize) -> Result<Vec<Interaction>, EngineError>;

    /// Rewinds working state of the current thread to an interaction.
    async fn time_travel(
        &self,
        interaction_id: InteractionId,
    ) -> Result<TimeTravelOutcome, EngineError>;

    /// Takes a manual checkpoint of the current thread.
    async fn create_checkpoint(
        &self,
        metadata: Map<String, Value>,
    ) -> Result<CheckpointOutcome, EngineError>;

    async fn debug_info(&self) -> DebugInfo;

    async fn health_check(&self) -> HealthReport;
}

/// Per-request overrides for `generate_completion`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub context_type: ContextType,
    /// Thread to use instead of the current one.
    pub thread_id: Option<ThreadId>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl RequestOptions {
    pub fn for_context(context_type: ContextType) -> Self {
        Self {
            context_type,
            ..Default::default()
        }
    }

    pub fn on_thread(mut self, thread_id: Option<ThreadId>) -> Self {
        self.thread_id = thread_id;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Result of `generate_completion`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub completion: Completion,
    /// `None` only in fallback mode.
    pub thread_id: Option<ThreadId>,
    /// `None` only in fallback mode.
    pub interaction_id: Option<InteractionId>,
    pub session_metrics: SessionMetrics,
    pub response_time_ms: u64,
    pub checkpoint_available: bool,
    pub fallback_mode: bool,
}

/// Result of `chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub conversation_id: Option<ThreadId>,
    pub thread_id: Option<ThreadId>,
    pub provider: ProviderId,
    pub fallback_mode: bool,
}

/// Environment details included in command prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandContext {
    pub platform: Option<String>,
    pub working_directory: Option<String>,
    #[serde(default)]
    pub available_tools: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of `explain_command` / `suggest_command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandHelp {
    pub content: String,
    pub provider: ProviderId,
    pub fallback_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewThreadOutcome {
    pub new_thread_id: ThreadId,
    pub previous_thread_id: Option<ThreadId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchOutcome {
    pub previous_thread: Option<ThreadId>,
    pub current_thread: ThreadId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeTravelOutcome {
    pub thread_id: ThreadId,
    pub restored_to: InteractionId,
    /// When the restored interaction was recorded.
    pub timestamp: Timestamp,
    pub session_metrics: SessionMetrics,
}

/// Result of a checkpoint request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckpointOutcome {
    Created {
        checkpoint_id: CheckpointId,
        interaction_id: InteractionId,
    },
    /// Nothing was written; the reason is also logged as a warning.
    Skipped { reason: String },
}

/// Point-in-time view of one registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSnapshot {
    pub id: ProviderId,
    pub display_name: String,
    pub status: ProviderStatus,
    pub last_latency_ms: u64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub current_thread: Option<ThreadId>,
    pub fallback_mode: bool,
    pub fallback_reason: Option<String>,
    pub session_metrics: SessionMetrics,
    pub provider_statuses: Vec<ProviderSnapshot>,
    pub active_provider: Option<ProviderId>,
    pub persistence_backend: Option<String>,
    pub persistence_enabled: bool,
    pub time_travel_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub provider: Option<ProviderId>,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
    pub fallback_mode: bool,
    pub current_thread: Option<ThreadId>,
}

/// Errors surfaced to engine callers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Retry budget (and fallback chain) exhausted. `attempts` counts calls
    /// to `provider`; `fallback_attempts` counts calls to the others.
    #[error("completion failed on {provider} after {attempts} attempt(s): {source}")]
    Completion {
        provider: ProviderId,
        attempts: u32,
        fallback_attempts: u32,
        source: ProviderError,
    },

    #[error("no ready provider is active")]
    NoActiveProvider,

    #[error("provider {0} not found")]
    ProviderNotFound(ProviderId),

    #[error("thread {0} not found")]
    ThreadNotFound(ThreadId),

    #[error("interaction {interaction_id} not found in thread {thread_id}")]
    InteractionNotFound {
        thread_id: ThreadId,
        interaction_id: InteractionId,
    },

    #[error("time travel is disabled")]
    TimeTravelDisabled,

    #[error("{operation} is not available in fallback mode")]
    FallbackMode { operation: &'static str },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl EngineError {
    pub fn fallback_mode(operation: &'static str) -> Self {
        Self::FallbackMode { operation }
    }

    /// True for unknown thread or interaction ids.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::ThreadNotFound(_)
                | EngineError::InteractionNotFound { .. }
                | EngineError::ProviderNotFound(_)
        )
    }
}
