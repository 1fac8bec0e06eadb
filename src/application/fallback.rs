//! Degraded engine used when the real one cannot be constructed.
//!
//! Assistance calls answer with clearly marked placeholders; stateful
//! operations refuse with `EngineError::FallbackMode`.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::conversation::{Interaction, SessionMetrics, ThreadMetadata};
use crate::domain::foundation::{InteractionId, ProviderId, ThreadId};
use crate::ports::{
    AssistantEngine, ChatReply, CheckpointOutcome, CommandContext, CommandHelp, Completion,
    CompletionOutcome, DebugInfo, EngineError, FinishReason, HealthReport, NewThreadOutcome,
    RequestOptions, SwitchOutcome, TimeTravelOutcome,
};

/// Provider id reported on placeholder responses.
pub const FALLBACK_PROVIDER_ID: &str = "fallback";

const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone)]
pub struct FallbackEngine {
    reason: String,
}

impl FallbackEngine {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    fn provider_id() -> ProviderId {
        ProviderId::from_static(FALLBACK_PROVIDER_ID)
    }

    fn placeholder(&self, request: &str) -> Completion {
        let preview: String = request.chars().take(PREVIEW_CHARS).collect();
        let ellipsis = if request.chars().count() > PREVIEW_CHARS {
            "..."
        } else {
            ""
        };
        Completion {
            content: format!(
                "[fallback mode] The assistant is unavailable ({}). \
                 No model was asked about: \"{}{}\"",
                self.reason, preview, ellipsis
            ),
            model: FALLBACK_PROVIDER_ID.to_string(),
            provider_id: Self::provider_id(),
            usage: None,
            finish_reason: FinishReason::Unknown,
            latency_ms: 0,
            placeholder: true,
        }
    }

    fn help(&self, request: &str) -> CommandHelp {
        CommandHelp {
            content: self.placeholder(request).content,
            provider: Self::provider_id(),
            fallback_mode: true,
        }
    }
}

#[async_trait]
impl AssistantEngine for FallbackEngine {
    fn is_fallback(&self) -> bool {
        true
    }

    async fn generate_completion(
        &self,
        prompt: &str,
        _options: RequestOptions,
    ) -> Result<CompletionOutcome, EngineError> {
        Ok(CompletionOutcome {
            completion: self.placeholder(prompt),
            thread_id: None,
            interaction_id: None,
            session_metrics: SessionMetrics::default(),
            response_time_ms: 0,
            checkpoint_available: false,
            fallback_mode: true,
        })
    }

    async fn chat(
        &self,
        message: &str,
        conversation_id: Option<ThreadId>,
    ) -> Result<ChatReply, EngineError> {
        Ok(ChatReply {
            response: self.placeholder(message).content,
            conversation_id,
            thread_id: None,
            provider: Self::provider_id(),
            fallback_mode: true,
        })
    }

    async fn explain_command(
        &self,
        command: &str,
        _context: &CommandContext,
    ) -> Result<CommandHelp, EngineError> {
        Ok(self.help(command))
    }

    async fn suggest_command(
        &self,
        description: &str,
        _context: &CommandContext,
    ) -> Result<CommandHelp, EngineError> {
        Ok(self.help(description))
    }

    async fn create_new_thread(
        &self,
        _metadata: ThreadMetadata,
    ) -> Result<NewThreadOutcome, EngineError> {
        Err(EngineError::fallback_mode("create_new_thread"))
    }

    async fn switch_thread(&self, _thread_id: ThreadId) -> Result<SwitchOutcome, EngineError> {
        Err(EngineError::fallback_mode("switch_thread"))
    }

    async fn list_threads(&self) -> Result<Vec<ThreadId>, EngineError> {
        Err(EngineError::fallback_mode("list_threads"))
    }

    async fn conversation_history(&self, _limit: usize) -> Result<Vec<Interaction>, EngineError> {
        Err(EngineError::fallback_mode("conversation_history"))
    }

    async fn time_travel(
        &self,
        _interaction_id: InteractionId,
    ) -> Result<TimeTravelOutcome, EngineError> {
        Err(EngineError::fallback_mode("time_travel"))
    }

    async fn create_checkpoint(
        &self,
        _metadata: Map<String, Value>,
    ) -> Result<CheckpointOutcome, EngineError> {
        Err(EngineError::fallback_mode("create_checkpoint"))
    }

    async fn debug_info(&self) -> DebugInfo {
        DebugInfo {
            current_thread: None,
            fallback_mode: true,
            fallback_reason: Some(self.reason.clone()),
            session_metrics: SessionMetrics::default(),
            provider_statuses: Vec::new(),
            active_provider: None,
            persistence_backend: None,
            persistence_enabled: false,
            time_travel_enabled: false,
        }
    }

    async fn health_check(&self) -> HealthReport {
        HealthReport {
            healthy: false,
            provider: None,
            latency_ms: None,
            error: Some(self.reason.clone()),
            fallback_mode: true,
            current_thread: None,
        }
    }
}
