//! Telemetry sink that writes events to the `tracing` pipeline.

use crate::ports::{TelemetryEvent, TelemetrySink};

/// Emits each event as a structured log record under the `telemetry` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record(&self, event: TelemetryEvent) {
        match &event {
            TelemetryEvent::ProviderFailed {
                provider,
                attempt,
                retryable,
                error,
                ..
            } => tracing::warn!(
                target: "telemetry",
                event = event.event_type(),
                provider = %provider,
                attempt,
                retryable,
                error = %error,
                "Provider call failed"
            ),
            TelemetryEvent::ProviderFallback { from, to, reason, .. } => tracing::warn!(
                target: "telemetry",
                event = event.event_type(),
                from = %from,
                to = %to,
                reason = %reason,
                "Falling back to another provider"
            ),
            TelemetryEvent::CompletionRecorded {
                provider,
                model,
                thread_id,
                prompt_tokens,
                completion_tokens,
                response_time_ms,
                ..
            } => tracing::info!(
                target: "telemetry",
                event = event.event_type(),
                provider = %provider,
                model = %model,
                thread_id = %thread_id,
                prompt_tokens,
                completion_tokens,
                response_time_ms,
                "Completion recorded"
            ),
            TelemetryEvent::CheckpointFailed { thread_id, reason, .. } => tracing::warn!(
                target: "telemetry",
                event = event.event_type(),
                thread_id = %thread_id,
                reason = %reason,
                "Checkpoint failed"
            ),
            TelemetryEvent::PersistenceDegraded {
                operation,
                thread_id,
                error,
                ..
            } => tracing::warn!(
                target: "telemetry",
                event = event.event_type(),
                operation = %operation,
                thread_id = ?thread_id,
                error = %error,
                "Persistence degraded"
            ),
            TelemetryEvent::FallbackActivated { reason, .. } => tracing::error!(
                target: "telemetry",
                event = event.event_type(),
                reason = %reason,
                "Fallback mode activated"
            ),
        }
    }
}
