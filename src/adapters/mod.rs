//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the engine to external systems:
//! - `ai` - Model providers (OpenAI, Anthropic, Ollama, mock)
//! - `persistence` - Conversation storage (memory, file, PostgreSQL)
//! - `telemetry` - Event sinks (tracing, channel, recording)

pub mod ai;
pub mod persistence;
pub mod telemetry;
