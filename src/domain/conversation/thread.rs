//! Conversation thread and its lifecycle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::foundation::{StateMachine, ThreadId, Timestamp};

/// Caller-supplied key/value labels attached to a thread.
pub type ThreadMetadata = BTreeMap<String, String>;

/// A durable conversation timeline.
///
/// The thread record itself is immutable; its interactions live in the
/// persistence backend and its lifecycle status is session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub created_at: Timestamp,
    #[serde(default)]
    pub metadata: ThreadMetadata,
}

impl Thread {
    /// Creates a fresh thread with a random id.
    pub fn new(metadata: ThreadMetadata) -> Self {
        Self {
            id: ThreadId::new(),
            created_at: Timestamp::now(),
            metadata,
        }
    }

    /// Reconstitutes a thread read back from storage.
    pub fn reconstitute(id: ThreadId, created_at: Timestamp, metadata: ThreadMetadata) -> Self {
        Self {
            id,
            created_at,
            metadata,
        }
    }
}

/// Lifecycle of a thread within a session.
///
/// `Created → Active → Suspended → Active ...`. There is no terminal state;
/// deleting threads is an administrative concern outside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Created,
    Active,
    Suspended,
}

impl StateMachine for ThreadStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ThreadStatus::*;
        matches!(
            (self, target),
            (Created, Active) | (Active, Suspended) | (Suspended, Active)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ThreadStatus::*;
        match self {
            Created => vec![Active],
            Active => vec![Suspended],
            Suspended => vec![Active],
        }
    }
}
