//! Application-layer errors and their mapping onto `EngineError`.

use thiserror::Error;

use crate::domain::foundation::{InteractionId, ProviderId, ThreadId};
use crate::ports::{EngineError, PersistenceError};

/// Errors from the conversation store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("thread {0} not found")]
    ThreadNotFound(ThreadId),

    #[error("interaction {interaction_id} not found in thread {thread_id}")]
    InteractionNotFound {
        thread_id: ThreadId,
        interaction_id: InteractionId,
    },

    #[error("time travel is disabled")]
    TimeTravelDisabled,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ThreadNotFound(id) => EngineError::ThreadNotFound(id),
            StoreError::InteractionNotFound {
                thread_id,
                interaction_id,
            } => EngineError::InteractionNotFound {
                thread_id,
                interaction_id,
            },
            StoreError::TimeTravelDisabled => EngineError::TimeTravelDisabled,
            StoreError::Persistence(e) => EngineError::Persistence(e),
        }
    }
}

/// Errors from the provider registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("provider {0} not registered")]
    NotFound(ProviderId),
}

impl From<RegistryError> for EngineError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => EngineError::ProviderNotFound(id),
        }
    }
}
