//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the engine and the outside world. Adapters implement these ports.
//!
//! ## Driven Ports
//!
//! - `ProviderAdapter` - One model backend behind a uniform completion call
//! - `PersistenceBackend` - Durable threads, interactions and checkpoints
//! - `TelemetrySink` - Non-blocking structured events for operators
//!
//! ## Driving Port
//!
//! - `AssistantEngine` - What callers (CLI drivers, front-ends) talk to

mod ai_provider;
mod assistant_engine;
mod persistence;
mod telemetry;

pub use ai_provider::{
    Completion, CompletionOptions, FinishReason, Locality, ProviderAdapter, ProviderDescriptor,
    ProviderError, ProviderHealth, ProviderStatus, TokenUsage,
};
pub use assistant_engine::{
    AssistantEngine, ChatReply, CheckpointOutcome, CommandContext, CommandHelp,
    CompletionOutcome, DebugInfo, EngineError, HealthReport, NewThreadOutcome, ProviderSnapshot,
    RequestOptions, SwitchOutcome, TimeTravelOutcome,
};
pub use persistence::{Checkpointer, PersistenceBackend, PersistenceError};
pub use telemetry::{NoOpTelemetry, TelemetryEvent, TelemetrySink};
