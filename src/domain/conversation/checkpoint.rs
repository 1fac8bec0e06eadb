//! Checkpoints: snapshots of engine-visible state pinned to an interaction.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::metrics::SessionMetrics;
use crate::domain::foundation::{CheckpointId, InteractionId, ThreadId, Timestamp};

/// Version written into every new checkpoint payload.
///
/// Readers accept any version; unknown fields of newer payloads are ignored
/// and extra state belongs in [`CheckpointPayload::extensions`].
pub const CHECKPOINT_PAYLOAD_VERSION: u32 = 1;

/// Why a checkpoint was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    /// Taken every `checkpoint_interval` interactions.
    Interval,
    /// Requested explicitly by the caller.
    Manual,
    /// Taken before rewinding working state.
    BeforeTimeTravel,
    /// Records the exact session metrics when a thread is switched away from.
    Suspend,
    /// Describes working state after a time travel; never persisted.
    Restore,
}

impl CheckpointKind {
    /// Whether this kind increments `SessionMetrics::checkpoint_count`.
    pub fn counts_toward_metrics(&self) -> bool {
        matches!(
            self,
            CheckpointKind::Interval | CheckpointKind::Manual | CheckpointKind::BeforeTimeTravel
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointKind::Interval => "interval",
            CheckpointKind::Manual => "manual",
            CheckpointKind::BeforeTimeTravel => "before_time_travel",
            CheckpointKind::Suspend => "suspend",
            CheckpointKind::Restore => "restore",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "interval" => Some(CheckpointKind::Interval),
            "manual" => Some(CheckpointKind::Manual),
            "before_time_travel" => Some(CheckpointKind::BeforeTimeTravel),
            "suspend" => Some(CheckpointKind::Suspend),
            "restore" => Some(CheckpointKind::Restore),
            _ => None,
        }
    }
}

/// Versioned, extensible body of a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointPayload {
    pub version: u32,
    pub interaction_count: u64,
    pub session_metrics: SessionMetrics,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub extensions: BTreeMap<String, Value>,
}

impl CheckpointPayload {
    pub fn new(interaction_count: u64, session_metrics: SessionMetrics) -> Self {
        Self {
            version: CHECKPOINT_PAYLOAD_VERSION,
            interaction_count,
            session_metrics,
            metadata: Map::new(),
            extensions: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A named snapshot referencing exactly one interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub thread_id: ThreadId,
    pub interaction_id: InteractionId,
    pub kind: CheckpointKind,
    pub created_at: Timestamp,
    pub payload: CheckpointPayload,
}

impl Checkpoint {
    pub fn new(
        thread_id: ThreadId,
        interaction_id: InteractionId,
        kind: CheckpointKind,
        payload: CheckpointPayload,
    ) -> Self {
        Self {
            id: CheckpointId::new(),
            thread_id,
            interaction_id,
            kind,
            created_at: Timestamp::now(),
            payload,
        }
    }
}
