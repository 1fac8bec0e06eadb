//! Application layer - orchestration of providers, threads and checkpoints.
//!
//! - `registry` - provider lifecycle, active selection, fallback order
//! - `retry` - bounded retries with exponential backoff
//! - `thread_store` - cached threads over a persistence backend
//! - `context_manager` - prompt enhancement from recent history
//! - `engine` - the `AssistantEngine` that ties them together
//! - `fallback` - placeholder engine for degraded startup
//! - `builder` / `integration` - construction from configuration

mod builder;
mod context_manager;
mod engine;
mod errors;
mod fallback;
mod integration;
pub mod prompts;
mod registry;
mod retry;
mod thread_store;

pub use builder::{BuildError, EngineBuilder};
pub use context_manager::ContextManager;
pub use engine::{EngineSettings, OrchestrationEngine};
pub use errors::{RegistryError, StoreError};
pub use fallback::{FallbackEngine, FALLBACK_PROVIDER_ID};
pub use integration::IntegrationAdapter;
pub use registry::ProviderRegistry;
pub use retry::{RetryFailure, RetryPolicy};
pub use thread_store::{Appended, ConversationStore, Rewound, StoreSettings};
