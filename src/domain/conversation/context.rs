//! Prompt enhancement from recent conversation history.
//!
//! Enhancement is a pure function of the history slice and the raw prompt:
//! identical inputs always produce byte-identical output, and the ids of the
//! interactions that went into the prompt are recorded as a
//! [`ContextSnapshot`] for audit and time travel.

use serde::{Deserialize, Serialize};

use super::interaction::Interaction;
use crate::domain::foundation::InteractionId;

/// Default number of recent interactions merged into a prompt.
pub const DEFAULT_CONTEXT_WINDOW: usize = 3;

const CONTEXT_HEADER: &str = "Context from recent interactions:";
const CURRENT_REQUEST_LABEL: &str = "Current request:";

/// Why a prompt is being sent, used for auditing and prompt shaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    #[default]
    General,
    Chat,
    CommandExplanation,
    CommandSuggestion,
}

/// Which interactions were used to build a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub context_type: ContextType,
    pub interaction_ids: Vec<InteractionId>,
}

impl ContextSnapshot {
    pub fn empty(context_type: ContextType) -> Self {
        Self {
            context_type,
            interaction_ids: Vec::new(),
        }
    }
}

/// A prompt ready to send to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancedPrompt {
    pub text: String,
    pub snapshot: ContextSnapshot,
}

/// Fixed-size window over the most recent interactions of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindow {
    size: usize,
}

impl ContextWindow {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Merges the tail of `history` (oldest→newest) ahead of `raw_prompt`.
    ///
    /// With no usable history the raw prompt is returned verbatim.
    pub fn enhance(
        &self,
        history: &[Interaction],
        raw_prompt: &str,
        context_type: ContextType,
    ) -> EnhancedPrompt {
        let start = history.len().saturating_sub(self.size);
        let recent = &history[start..];

        if recent.is_empty() {
            return EnhancedPrompt {
                text: raw_prompt.to_string(),
                snapshot: ContextSnapshot::empty(context_type),
            };
        }

        let mut text = String::from(CONTEXT_HEADER);
        for interaction in recent {
            text.push_str("\nPrevious: ");
            text.push_str(&interaction.prompt);
            text.push_str(" -> ");
            text.push_str(&interaction.response);
        }
        text.push_str("\n\n");
        text.push_str(CURRENT_REQUEST_LABEL);
        text.push(' ');
        text.push_str(raw_prompt);

        EnhancedPrompt {
            text,
            snapshot: ContextSnapshot {
                context_type,
                interaction_ids: recent.iter().map(|i| i.id).collect(),
            },
        }
    }
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_WINDOW)
    }
}
