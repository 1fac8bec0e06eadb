//! Telemetry Sink Port - structured events for operators.
//!
//! Recovered errors are never swallowed silently: they are reported here so
//! "degraded but working" can be told apart from "fully healthy".
//! [`TelemetrySink::record`] is synchronous and must not block.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ProviderId, ThreadId, Timestamp};

/// Receiver of engine telemetry.
pub trait TelemetrySink: Send + Sync {
    /// Accepts an event. Implementations must return promptly.
    fn record(&self, event: TelemetryEvent);
}

/// No-op sink for when telemetry isn't needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTelemetry;

impl TelemetrySink for NoOpTelemetry {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Events emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A provider call failed.
    ProviderFailed {
        provider: ProviderId,
        attempt: u32,
        retryable: bool,
        error: String,
        occurred_at: Timestamp,
    },

    /// A request moved from one provider to another.
    ProviderFallback {
        from: ProviderId,
        to: ProviderId,
        reason: String,
        occurred_at: Timestamp,
    },

    /// A completion was recorded.
    CompletionRecorded {
        provider: ProviderId,
        model: String,
        thread_id: ThreadId,
        prompt_tokens: u32,
        completion_tokens: u32,
        response_time_ms: u64,
        occurred_at: Timestamp,
    },

    /// A checkpoint could not be created.
    CheckpointFailed {
        thread_id: ThreadId,
        reason: String,
        occurred_at: Timestamp,
    },

    /// A persistence call failed and the engine continued without it.
    PersistenceDegraded {
        operation: String,
        thread_id: Option<ThreadId>,
        error: String,
        occurred_at: Timestamp,
    },

    /// The engine could not be constructed and fallback mode took over.
    FallbackActivated {
        reason: String,
        occurred_at: Timestamp,
    },
}

impl TelemetryEvent {
    pub fn provider_failed(
        provider: &ProviderId,
        attempt: u32,
        error: &crate::ports::ProviderError,
    ) -> Self {
        Self::ProviderFailed {
            provider: provider.clone(),
            attempt,
            retryable: error.is_retryable(),
            error: error.to_string(),
            occurred_at: Timestamp::now(),
        }
    }

    pub fn provider_fallback(from: &ProviderId, to: &ProviderId, reason: impl Into<String>) -> Self {
        Self::ProviderFallback {
            from: from.clone(),
            to: to.clone(),
            reason: reason.into(),
            occurred_at: Timestamp::now(),
        }
    }

    pub fn checkpoint_failed(thread_id: ThreadId, reason: impl Into<String>) -> Self {
        Self::CheckpointFailed {
            thread_id,
            reason: reason.into(),
            occurred_at: Timestamp::now(),
        }
    }

    pub fn persistence_degraded(
        operation: impl Into<String>,
        thread_id: Option<ThreadId>,
        error: impl std::fmt::Display,
    ) -> Self {
        Self::PersistenceDegraded {
            operation: operation.into(),
            thread_id,
            error: error.to_string(),
            occurred_at: Timestamp::now(),
        }
    }

    pub fn fallback_activated(reason: impl Into<String>) -> Self {
        Self::FallbackActivated {
            reason: reason.into(),
            occurred_at: Timestamp::now(),
        }
    }

    /// Stable name of the event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            TelemetryEvent::ProviderFailed { .. } => "provider_failed",
            TelemetryEvent::ProviderFallback { .. } => "provider_fallback",
            TelemetryEvent::CompletionRecorded { .. } => "completion_recorded",
            TelemetryEvent::CheckpointFailed { .. } => "checkpoint_failed",
            TelemetryEvent::PersistenceDegraded { .. } => "persistence_degraded",
            TelemetryEvent::FallbackActivated { .. } => "fallback_activated",
        }
    }
}
