//! Recorded request/response exchanges.

use serde::{Deserialize, Serialize};

use super::context::ContextSnapshot;
use crate::domain::foundation::{InteractionId, ProviderId, ThreadId, Timestamp};

/// Token usage for a single completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Creates a usage record; the total is derived.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Everything about an exchange except the position it will occupy.
///
/// The store turns a draft into an [`Interaction`] by assigning the next id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionDraft {
    pub prompt: String,
    pub response: String,
    pub provider_id: ProviderId,
    pub model: String,
    pub context_snapshot: ContextSnapshot,
    pub duration_ms: u64,
    pub usage: Option<TokenUsage>,
}

/// One immutable prompt/response pair within a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionId,
    pub thread_id: ThreadId,
    pub timestamp: Timestamp,
    /// The caller's prompt before context enhancement.
    pub prompt: String,
    pub response: String,
    pub provider_id: ProviderId,
    pub model: String,
    pub context_snapshot: ContextSnapshot,
    pub duration_ms: u64,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl Interaction {
    /// Seals a draft at the given position.
    pub fn record(id: InteractionId, thread_id: ThreadId, draft: InteractionDraft) -> Self {
        Self {
            id,
            thread_id,
            timestamp: Timestamp::now(),
            prompt: draft.prompt,
            response: draft.response,
            provider_id: draft.provider_id,
            model: draft.model,
            context_snapshot: draft.context_snapshot,
            duration_ms: draft.duration_ms,
            usage: draft.usage,
        }
    }
}
