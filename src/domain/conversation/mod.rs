//! Conversation domain: threads, interactions, checkpoints and metrics.

mod checkpoint;
mod context;
mod interaction;
mod metrics;
mod thread;

pub use checkpoint::{Checkpoint, CheckpointKind, CheckpointPayload, CHECKPOINT_PAYLOAD_VERSION};
pub use context::{
    ContextSnapshot, ContextType, ContextWindow, EnhancedPrompt, DEFAULT_CONTEXT_WINDOW,
};
pub use interaction::{Interaction, InteractionDraft, TokenUsage};
pub use metrics::{latest_checkpoint, SessionMetrics};
pub use thread::{Thread, ThreadMetadata, ThreadStatus};
