// =============================================================================
// Engine events — pull-based fan-out over a broadcast channel
// =============================================================================
//
// The engine never calls back into consumers. It publishes onto a tokio
// broadcast channel and each consumer pulls from its own receiver, so a
// consumer that reacts by mutating the engine cannot re-enter a publish.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::market_data::{QueryWindow, Resolution};

/// Notifications for the presentation and transport collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Historic candles are needed for this pair. `generation` identifies the
    /// symbol state the request belongs to; a response for an older
    /// generation is stale.
    HistoricNeeded {
        symbol: String,
        resolution: Resolution,
        window: Option<QueryWindow>,
        generation: u64,
    },
    QuoteNeeded { symbol: String },
    SearchNeeded { symbol: String },
    SubscribeRequested { symbol: String },
    UnsubscribeRequested { symbol: String },
    AlarmTriggered { symbol: String, threshold: f64 },
    /// The merged series for this pair changed and should be re-read.
    SeriesUpdated { symbol: String, resolution: Resolution },
    /// Quote, search or symbol-level data changed.
    SymbolUpdated { symbol: String },
}

impl EngineEvent {
    pub fn symbol(&self) -> &str {
        match self {
            EngineEvent::HistoricNeeded { symbol, .. }
            | EngineEvent::QuoteNeeded { symbol }
            | EngineEvent::SearchNeeded { symbol }
            | EngineEvent::SubscribeRequested { symbol }
            | EngineEvent::UnsubscribeRequested { symbol }
            | EngineEvent::AlarmTriggered { symbol, .. }
            | EngineEvent::SeriesUpdated { symbol, .. }
            | EngineEvent::SymbolUpdated { symbol } => symbol,
        }
    }
}

/// Broadcast publisher shared by every symbol.
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
    published: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            published: AtomicU64::new(0),
        }
    }

    /// Publish to all current receivers. With no receiver the event is
    /// dropped; the engine's state does not depend on delivery.
    pub fn publish(&self, event: EngineEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(event).is_err() {
            debug!("event published with no subscribers");
        }
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = EngineEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    /// Receiver that sees every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Total events published since creation.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(EngineEvent::QuoteNeeded { symbol: "A".into() });
        bus.publish(EngineEvent::SymbolUpdated { symbol: "B".into() });

        assert_eq!(rx.recv().await.unwrap().symbol(), "A");
        assert_eq!(rx.recv().await.unwrap().symbol(), "B");
        assert_eq!(bus.published(), 2);
    }

    #[test]
    fn publish_without_subscribers_is_harmless() {
        let bus = EventBus::new(4);
        bus.publish(EngineEvent::SearchNeeded { symbol: "A".into() });
        assert_eq!(bus.published(), 1);
    }

    #[test]
    fn events_serialise_with_tag() {
        let ev = EngineEvent::AlarmTriggered {
            symbol: "X".into(),
            threshold: 100.0,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "alarm_triggered");
        assert_eq!(json["threshold"], 100.0);
    }
}
