//! Telemetry sink that forwards events over a bounded channel.
//!
//! Lets an exporter task consume events without ever blocking the engine.
//! When the channel is full or closed the event is dropped and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::ports::{TelemetryEvent, TelemetrySink};

pub struct ChannelTelemetry {
    sender: mpsc::Sender<TelemetryEvent>,
    dropped: AtomicU64,
}

impl ChannelTelemetry {
    /// Creates the sink and the receiving end for the exporter.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TelemetryEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    /// Events discarded because the channel was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl TelemetrySink for ChannelTelemetry {
    fn record(&self, event: TelemetryEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) | Err(TrySendError::Closed(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    event = event.event_type(),
                    dropped,
                    "Telemetry channel unavailable, event dropped"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwards_events_to_receiver() {
        let (sink, mut rx) = ChannelTelemetry::new(4);
        sink.record(TelemetryEvent::fallback_activated("boom"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "fallback_activated");
        assert_eq!(sink.dropped(), 0);
    }

    #[test]
    fn full_channel_drops_without_blocking() {
        let (sink, _rx) = ChannelTelemetry::new(1);
        sink.record(TelemetryEvent::fallback_activated("one"));
        sink.record(TelemetryEvent::fallback_activated("two"));
        assert_eq!(sink.dropped(), 1);
    }

    #[test]
    fn closed_channel_drops() {
        let (sink, rx) = ChannelTelemetry::new(1);
        drop(rx);
        sink.record(TelemetryEvent::fallback_activated("gone"));
        assert_eq!(sink.dropped(), 1);
    }
}
