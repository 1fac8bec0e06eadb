//! Per-thread session counters.

use serde::{Deserialize, Serialize};

use super::checkpoint::{Checkpoint, CheckpointKind};
use super::interaction::Interaction;

/// Aggregate counters for the lifetime of a thread.
///
/// The average response time is always recomputed from the integer total so
/// that metrics rebuilt from storage compare equal to the live ones.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub total_interactions: u64,
    pub total_response_ms: u64,
    pub average_response_ms: f64,
    pub error_count: u64,
    pub checkpoint_count: u64,
    #[serde(default)]
    pub persistence_errors: u64,
}

impl SessionMetrics {
    pub fn record_interaction(&mut self, duration_ms: u64) {
        self.total_interactions += 1;
        self.total_response_ms += duration_ms;
        self.refresh_average();
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    pub fn record_checkpoint(&mut self) {
        self.checkpoint_count += 1;
    }

    pub fn record_persistence_error(&mut self) {
        self.persistence_errors += 1;
    }

    /// Rebuilds metrics from stored interactions and checkpoints.
    ///
    /// Interaction totals come from `interactions`. Error counters are not
    /// derivable from interactions, so they are taken from the snapshot in
    /// the most recent checkpoint.
    pub fn derive(interactions: &[Interaction], checkpoints: &[Checkpoint]) -> Self {
        let mut metrics = SessionMetrics {
            total_interactions: interactions.len() as u64,
            total_response_ms: interactions.iter().map(|i| i.duration_ms).sum(),
            checkpoint_count: checkpoints
                .iter()
                .filter(|c| c.kind.counts_toward_metrics())
                .count() as u64,
            ..Default::default()
        };
        if let Some(latest) = latest_checkpoint(checkpoints) {
            metrics.error_count = latest.payload.session_metrics.error_count;
            metrics.persistence_errors = latest.payload.session_metrics.persistence_errors;
        }
        metrics.refresh_average();
        metrics
    }

    /// Metrics for a thread being resumed.
    ///
    /// If the latest checkpoint was written on suspend and nothing has been
    /// appended since, its snapshot is exact and used as-is. Otherwise the
    /// metrics are derived.
    pub fn restore(interactions: &[Interaction], checkpoints: &[Checkpoint]) -> Self {
        let last_interaction = interactions.last().map(|i| i.id);
        match latest_checkpoint(checkpoints) {
            Some(cp)
                if cp.kind == CheckpointKind::Suspend
                    && Some(cp.interaction_id) == last_interaction =>
            {
                cp.payload.session_metrics.clone()
            }
            _ => Self::derive(interactions, checkpoints),
        }
    }

    fn refresh_average(&mut self) {
        self.average_response_ms = if self.total_interactions == 0 {
            0.0
        } else {
            self.total_response_ms as f64 / self.total_interactions as f64
        };
    }
}

/// Most recent checkpoint by interaction position, then creation time.
pub fn latest_checkpoint(checkpoints: &[Checkpoint]) -> Option<&Checkpoint> {
    checkpoints
        .iter()
        .max_by_key(|c| (c.interaction_id, c.created_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::{
        CheckpointPayload, ContextSnapshot, ContextType, InteractionDraft,
    };
    use crate::domain::foundation::{InteractionId, ProviderId, ThreadId};

    fn interactions(thread_id: ThreadId, durations: &[u64]) -> Vec<Interaction> {
        durations
            .iter()
            .enumerate()
            .map(|(i, d)| {
                Interaction::record(
                    InteractionId::new(i as u64),
                    thread_id,
                    InteractionDraft {
                        prompt: "p".to_string(),
                        response: "r".to_string(),
                        provider_id: ProviderId::from_static("mock"),
                        model: "m".to_string(),
                        context_snapshot: ContextSnapshot::empty(ContextType::Chat),
                        duration_ms: *d,
                        usage: None,
                    },
                )
            })
            .collect()
    }

    fn checkpoint(
        thread_id: ThreadId,
        at: u64,
        kind: CheckpointKind,
        metrics: SessionMetrics,
    ) -> Checkpoint {
        Checkpoint::new(
            thread_id,
            InteractionId::new(at),
            kind,
            CheckpointPayload::new(at + 1, metrics),
        )
    }

    #[test]
    fn running_average_matches_mean() {
        let mut metrics = SessionMetrics::default();
        metrics.record_interaction(100);
        metrics.record_interaction(200);
        metrics.record_interaction(600);

        assert_eq!(metrics.total_interactions, 3);
        assert_eq!(metrics.average_response_ms, 300.0);
    }

    #[test]
    fn derive_counts_interactions_and_metric_checkpoints() {
        let thread_id = ThreadId::new();
        let history = interactions(thread_id, &[10, 20, 30, 40]);
        let errors = SessionMetrics {
            error_count: 2,
            ..Default::default()
        };
        let checkpoints = vec![
            checkpoint(thread_id, 1, CheckpointKind::Interval, SessionMetrics::default()),
            checkpoint(thread_id, 3, CheckpointKind::Interval, errors),
            checkpoint(thread_id, 2, CheckpointKind::Suspend, SessionMetrics::default()),
        ];

        let metrics = SessionMetrics::derive(&history, &checkpoints);

        assert_eq!(metrics.total_interactions, 4);
        assert_eq!(metrics.total_response_ms, 100);
        assert_eq!(metrics.average_response_ms, 25.0);
        assert_eq!(metrics.checkpoint_count, 2);
        assert_eq!(metrics.error_count, 2);
    }

    #[test]
    fn derive_of_empty_thread_is_default() {
        assert_eq!(SessionMetrics::derive(&[], &[]), SessionMetrics::default());
    }

    #[test]
    fn restore_prefers_current_suspend_snapshot() {
        let thread_id = ThreadId::new();
        let history = interactions(thread_id, &[10, 20]);
        let snapshot = SessionMetrics {
            total_interactions: 2,
            total_response_ms: 30,
            average_response_ms: 15.0,
            error_count: 5,
            checkpoint_count: 0,
            persistence_errors: 1,
        };
        let checkpoints = vec![checkpoint(
            thread_id,
            1,
            CheckpointKind::Suspend,
            snapshot.clone(),
        )];

        assert_eq!(SessionMetrics::restore(&history, &checkpoints), snapshot);
    }

    #[test]
    fn restore_derives_when_snapshot_is_stale() {
        let thread_id = ThreadId::new();
        let history = interactions(thread_id, &[10, 20, 30]);
        let stale = SessionMetrics {
            total_interactions: 2,
            error_count: 1,
            ..Default::default()
        };
        let checkpoints = vec![checkpoint(thread_id, 1, CheckpointKind::Suspend, stale)];

        let metrics = SessionMetrics::restore(&history, &checkpoints);
        assert_eq!(metrics.total_interactions, 3);
        assert_eq!(metrics.error_count, 1);
    }
}
