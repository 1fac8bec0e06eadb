//! Builds enhanced prompts from a thread's working window.

use std::sync::Arc;

use super::thread_store::ConversationStore;
use crate::domain::conversation::{ContextType, ContextWindow, EnhancedPrompt};
use crate::domain::foundation::ThreadId;

/// Fetches recent history from the store and applies the pure
/// [`ContextWindow::enhance`]. An unknown thread simply has no history.
#[derive(Clone)]
pub struct ContextManager {
    store: Arc<ConversationStore>,
    window: ContextWindow,
}

impl ContextManager {
    pub fn new(store: Arc<ConversationStore>, window: ContextWindow) -> Self {
        Self { store, window }
    }

    pub fn window(&self) -> ContextWindow {
        self.window
    }

    pub async fn build_prompt(
        &self,
        raw_prompt: &str,
        context_type: ContextType,
        thread_id: ThreadId,
    ) -> EnhancedPrompt {
        let history = self
            .store
            .working_window(thread_id, self.window.size())
            .await;
        self.window.enhance(&history, raw_prompt, context_type)
    }
}
