//! Persistence Backend Port - durable storage for threads, interactions and
//! checkpoints.
//!
//! Backends are treated as unreliable: the conversation store wraps every
//! call and degrades instead of failing the caller's request.

use async_trait::async_trait;
use secrecy::Secret;
use std::sync::Arc;

use crate::domain::conversation::{Checkpoint, Interaction, Thread, ThreadMetadata};
use crate::domain::foundation::ThreadId;

/// Port for conversation persistence.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Short name used in logs and debug output.
    fn name(&self) -> &'static str;

    /// Connects and prepares storage. Called once before any other method.
    async fn init(&self, credentials: Option<&Secret<String>>) -> Result<(), PersistenceError>;

    /// Creates and stores a new thread.
    async fn new_thread(&self, metadata: ThreadMetadata) -> Result<Thread, PersistenceError>;

    /// Loads a thread record, `None` if unknown.
    async fn load_thread(&self, thread_id: ThreadId) -> Result<Option<Thread>, PersistenceError>;

    /// All stored threads in creation order.
    async fn list_threads(&self) -> Result<Vec<Thread>, PersistenceError>;

    /// Appends an interaction to its thread.
    async fn put_interaction(&self, interaction: &Interaction) -> Result<(), PersistenceError>;

    /// Interactions of a thread, oldest first. With a limit, only the most
    /// recent `limit` are returned (still oldest first).
    async fn interactions(
        &self,
        thread_id: ThreadId,
        limit: Option<usize>,
    ) -> Result<Vec<Interaction>, PersistenceError>;

    /// Stores a checkpoint.
    async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), PersistenceError>;

    /// Checkpoints of a thread in creation order.
    async fn checkpoint_history(
        &self,
        thread_id: ThreadId,
    ) -> Result<Vec<Checkpoint>, PersistenceError>;
}

/// Handle bound to one thread, mirroring the backend's checkpointer shape.
#[derive(Clone)]
pub struct Checkpointer {
    backend: Arc<dyn PersistenceBackend>,
    thread_id: ThreadId,
    limit: usize,
}

impl Checkpointer {
    pub fn new(backend: Arc<dyn PersistenceBackend>, thread_id: ThreadId, limit: usize) -> Self {
        Self {
            backend,
            thread_id,
            limit,
        }
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Records an interaction for the bound thread.
    pub async fn put(&self, interaction: &Interaction) -> Result<(), PersistenceError> {
        if interaction.thread_id != self.thread_id {
            return Err(PersistenceError::WriteFailed(format!(
                "interaction belongs to thread {}, checkpointer is bound to {}",
                interaction.thread_id, self.thread_id
            )));
        }
        self.backend.put_interaction(interaction).await
    }

    /// Records a checkpoint for the bound thread.
    pub async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), PersistenceError> {
        if checkpoint.thread_id != self.thread_id {
            return Err(PersistenceError::WriteFailed(format!(
                "checkpoint belongs to thread {}, checkpointer is bound to {}",
                checkpoint.thread_id, self.thread_id
            )));
        }
        self.backend.put_checkpoint(checkpoint).await
    }

    /// The most recent checkpoint, if any.
    pub async fn get(&self) -> Result<Option<Checkpoint>, PersistenceError> {
        let history = self.history().await?;
        Ok(crate::domain::conversation::latest_checkpoint(&history).cloned())
    }

    /// Up to `limit` most recent checkpoints in creation order.
    pub async fn history(&self) -> Result<Vec<Checkpoint>, PersistenceError> {
        let mut all = self.backend.checkpoint_history(self.thread_id).await?;
        if all.len() > self.limit {
            all.drain(..all.len() - self.limit);
        }
        Ok(all)
    }
}

/// Errors from persistence operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    /// Backend cannot be reached or was never initialized.
    #[error("persistence backend unavailable: {0}")]
    Unavailable(String),

    /// Backend rejected the credentials.
    #[error("persistence authentication failed: {0}")]
    Unauthorized(String),

    /// A write did not complete.
    #[error("persistence write failed: {0}")]
    WriteFailed(String),

    /// Stored data could not be decoded.
    #[error("corrupt persisted record: {0}")]
    Corrupt(String),

    /// An interaction with this id already exists.
    #[error("interaction {interaction_id} already recorded for thread {thread_id}")]
    Duplicate {
        thread_id: ThreadId,
        interaction_id: u64,
    },
}

impl PersistenceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::WriteFailed(message.into())
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}
