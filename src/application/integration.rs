//! Entry point for callers: builds the engine from configuration and
//! degrades to `FallbackEngine` when construction fails at runtime.

use serde_json::{Map, Value};
use std::sync::Arc;

use super::builder::{BuildError, EngineBuilder};
use super::fallback::FallbackEngine;
use crate::adapters::telemetry::TracingTelemetry;
use crate::config::{ConfigError, EngineConfig};
use crate::domain::conversation::{Interaction, ThreadMetadata};
use crate::domain::foundation::{InteractionId, ThreadId};
use crate::ports::{
    AssistantEngine, ChatReply, CheckpointOutcome, CommandContext, CommandHelp,
    CompletionOutcome, DebugInfo, EngineError, HealthReport, NewThreadOutcome, RequestOptions,
    SwitchOutcome, TelemetryEvent, TelemetrySink, TimeTravelOutcome,
};

pub struct IntegrationAdapter {
    engine: Arc<dyn AssistantEngine>,
}

impl IntegrationAdapter {
    /// Loads configuration from the environment and builds the engine.
    ///
    /// Invalid configuration is an error; an unreachable backend is not.
    pub async fn from_env() -> Result<Self, ConfigError> {
        let config = EngineConfig::load_validated()?;
        Self::from_builder(EngineBuilder::new(config).with_telemetry(Arc::new(TracingTelemetry)))
            .await
    }

    pub async fn from_config(
        config: EngineConfig,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self, ConfigError> {
        Self::from_builder(EngineBuilder::new(config).with_telemetry(telemetry)).await
    }

    pub async fn from_builder(builder: EngineBuilder) -> Result<Self, ConfigError> {
        let telemetry = builder.telemetry();
        match builder.build().await {
            Ok(engine) => Ok(Self::with_engine(Arc::new(engine))),
            Err(BuildError::Config(e)) => Err(e.into()),
            Err(e @ BuildError::Persistence(_)) => {
                let reason = e.to_string();
                tracing::error!(reason = %reason, "Engine unavailable, entering fallback mode");
                telemetry.record(TelemetryEvent::fallback_activated(reason.clone()));
                Ok(Self::with_engine(Arc::new(FallbackEngine::new(reason))))
            }
        }
    }

    pub fn with_engine(engine: Arc<dyn AssistantEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<dyn AssistantEngine> {
        &self.engine
    }

    pub fn is_fallback(&self) -> bool {
        self.engine.is_fallback()
    }

    pub async fn generate_completion(
        &self,
        prompt: &str,
        options: RequestOptions,
    ) -> Result<CompletionOutcome, EngineError> {
        self.engine.generate_completion(prompt, options).await
    }

    pub async fn chat(
        &self,
        message: &str,
        conversation_id: Option<ThreadId>,
    ) -> Result<ChatReply, EngineError> {
        self.engine.chat(message, conversation_id).await
    }

    pub async fn explain_command(
        &self,
        command: &str,
        context: &CommandContext,
    ) -> Result<CommandHelp, EngineError> {
        self.engine.explain_command(command, context).await
    }

    pub async fn suggest_command(
        &self,
        description: &str,
        context: &CommandContext,
    ) -> Result<CommandHelp, EngineError> {
        self.engine.suggest_command(description, context).await
    }

    pub async fn create_new_thread(
        &self,
        metadata: ThreadMetadata,
    ) -> Result<NewThreadOutcome, EngineError> {
        self.engine.create_new_thread(metadata).await
    }

    pub async fn switch_thread(&self, thread_id: ThreadId) -> Result<SwitchOutcome, EngineError> {
        self.engine.switch_thread(thread_id).await
    }

    pub async fn list_threads(&self) -> Result<Vec<ThreadId>, EngineError> {
        self.engine.list_threads().await
    }

    pub async fn conversation_history(&self, limit: usize) -> Result<Vec<Interaction>, EngineError> {
        self.engine.conversation_history(limit).await
    }

    pub async fn time_travel(
        &self,
        interaction_id: InteractionId,
    ) -> Result<TimeTravelOutcome, EngineError> {
        self.engine.time_travel(interaction_id).await
    }

    pub async fn create_checkpoint(
        &self,
        metadata: Map<String, Value>,
    ) -> Result<CheckpointOutcome, EngineError> {
        self.engine.create_checkpoint(metadata).await
    }

    pub async fn debug_info(&self) -> DebugInfo {
        self.engine.debug_info().await
    }

    pub async fn health_check(&self) -> HealthReport {
        self.engine.health_check().await
    }
}
