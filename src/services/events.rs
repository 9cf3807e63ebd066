use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::{Stream, StreamExt};

use crate::models::snapshot::EngineEvent;

/// Fan-out of engine events to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventHub {
    broadcaster: broadcast::Sender<EngineEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (broadcaster, _receiver) = broadcast::channel(capacity.max(1));
        Self { broadcaster }
    }

    pub fn publish(&self, event: EngineEvent) {
        // no subscribers is fine
        let _ = self.broadcaster.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.broadcaster.subscribe()
    }

    /// Event stream that skips over messages a slow consumer lagged behind on
    pub fn stream(&self) -> impl Stream<Item = EngineEvent> {
        BroadcastStream::new(self.subscribe()).filter_map(|message| match message {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!("event subscriber lagged, skipped {} events", skipped);
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::level::{LevelKey, LevelType};
    use chrono::{TimeZone, Utc};

    fn make_event(seq: u32) -> EngineEvent {
        EngineEvent::LevelDeactivated {
            key: LevelKey {
                symbol: "SPY".to_string(),
                seq,
            },
            price: 400.0,
            level_type: LevelType::Support,
            at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn stream_delivers_published_events() {
        let hub = EventHub::new(8);
        let mut stream = Box::pin(hub.stream());

        hub.publish(make_event(1));
        hub.publish(make_event(2));

        assert_eq!(stream.next().await, Some(make_event(1)));
        assert_eq!(stream.next().await, Some(make_event(2)));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let hub = EventHub::new(1);
        hub.publish(make_event(1));
    }

    #[tokio::test]
    async fn lagged_subscriber_skips_ahead() {
        let hub = EventHub::new(2);
        let mut stream = Box::pin(hub.stream());

        for seq in 1..=5 {
            hub.publish(make_event(seq));
        }

        assert_eq!(stream.next().await, Some(make_event(4)));
        assert_eq!(stream.next().await, Some(make_event(5)));
    }
}
