//! Telemetry sinks.
//!
//! - `TracingTelemetry` - structured log records (default)
//! - `ChannelTelemetry` - bounded channel for an exporter task
//! - `RecordingTelemetry` - captures events for test assertions

mod channel;
mod in_memory;
mod tracing_sink;

pub use channel::ChannelTelemetry;
pub use in_memory::RecordingTelemetry;
pub use tracing_sink::TracingTelemetry;
