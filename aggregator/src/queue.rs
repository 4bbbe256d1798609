use tokio::sync::mpsc;

use crate::api::ApiError;
use crate::event::Event;

/// Hand-off buffer between intake and the consumer. Pure storage and order:
/// unbounded, arrival-ordered, no business logic.
///
/// Shutdown discipline comes from channel close semantics: when the last
/// `EventQueue` clone is dropped, the receiver keeps yielding whatever was
/// already enqueued and only then returns `None`, so the consumer drains
/// before stopping.
#[derive(Clone)]
pub struct EventQueue {
    sender: mpsc::UnboundedSender<Event>,
}

impl EventQueue {
    pub fn new() -> (EventQueue, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (EventQueue { sender }, receiver)
    }

    /// Enqueue one event. Never blocks; only fails once the consumer is
    /// gone, which does not happen while the server accepts traffic.
    pub fn put(&self, event: Event) -> Result<(), ApiError> {
        self.sender.send(event).map_err(|_| ApiError::IntakeClosed)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::EventQueue;
    use crate::api::ApiError;
    use crate::event::Event;

    fn event(id: &str) -> Event {
        Event {
            topic: "t".to_string(),
            event_id: id.to_string(),
            timestamp: "2025-10-24T00:00:00Z".to_string(),
            source: String::new(),
            payload: Map::new(),
        }
    }

    #[tokio::test]
    async fn preserves_arrival_order() {
        let (queue, mut receiver) = EventQueue::new();
        queue.put(event("a")).unwrap();
        queue.put(event("b")).unwrap();
        queue.put(event("c")).unwrap();

        assert_eq!(receiver.recv().await.unwrap().event_id, "a");
        assert_eq!(receiver.recv().await.unwrap().event_id, "b");
        assert_eq!(receiver.recv().await.unwrap().event_id, "c");
    }

    #[tokio::test]
    async fn drains_remaining_items_after_intake_closes() {
        let (queue, mut receiver) = EventQueue::new();
        queue.put(event("a")).unwrap();
        queue.put(event("b")).unwrap();
        drop(queue);

        // Already-accepted events still come out, then the closed signal
        assert_eq!(receiver.recv().await.unwrap().event_id, "a");
        assert_eq!(receiver.recv().await.unwrap().event_id, "b");
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn put_fails_once_the_consumer_is_gone() {
        let (queue, receiver) = EventQueue::new();
        drop(receiver);

        let err = queue.put(event("a")).unwrap_err();
        assert!(matches!(err, ApiError::IntakeClosed));
    }
}
