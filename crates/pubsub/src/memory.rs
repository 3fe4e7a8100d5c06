use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::bus::{MessageHandler, PubSub};
use crate::message::Message;
use crate::{PubSubError, Result};

#[derive(Default)]
struct State {
    subscribers: HashMap<String, Vec<MessageHandler>>,
    closed: bool,
}

/// In-memory pub/sub implementation for tests and single-process use.
///
/// Each delivery runs on its own spawned task, so publishing never blocks
/// on subscriber work and handlers for one message may run concurrently
/// with handlers for the next.
#[derive(Clone, Default)]
pub struct InMemoryPubSub {
    state: Arc<RwLock<State>>,
}

impl InMemoryPubSub {
    /// Creates a new bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of subscribers on `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.state
            .read()
            .await
            .subscribers
            .get(topic)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl PubSub for InMemoryPubSub {
    async fn publish(&self, topic: &str, message: Message) -> Result<()> {
        let state = self.state.read().await;
        if state.closed {
            return Err(PubSubError::Closed);
        }

        let Some(handlers) = state.subscribers.get(topic) else {
            // Zero subscribers is not an error.
            return Ok(());
        };

        for handler in handlers {
            let handler = Arc::clone(handler);
            let message = message.clone();
            tokio::spawn(async move {
                handler(message).await;
            });
        }

        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<()> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(PubSubError::Closed);
        }

        state
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.closed = true;
        state.subscribers.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{SagaId, StepId};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn channel_handler(tx: mpsc::UnboundedSender<Message>) -> MessageHandler {
        Arc::new(move |message| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(message);
            })
        })
    }

    #[tokio::test]
    async fn publish_delivers_to_subscriber() {
        let bus = InMemoryPubSub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe("topic", channel_handler(tx)).await.unwrap();

        let msg = Message::execute(SagaId::new(), StepId::new());
        bus.publish("topic", msg.clone()).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("delivery timed out")
            .unwrap();
        assert_eq!(received.step_id, msg.step_id);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = InMemoryPubSub::new();
        let msg = Message::execute(SagaId::new(), StepId::new());
        assert!(bus.publish("empty", msg).await.is_ok());
    }

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let bus = InMemoryPubSub::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        bus.subscribe("topic", channel_handler(tx1)).await.unwrap();
        bus.subscribe("topic", channel_handler(tx2)).await.unwrap();

        bus.publish("topic", Message::execute(SagaId::new(), StepId::new()))
            .await
            .unwrap();

        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = InMemoryPubSub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe("a", channel_handler(tx)).await.unwrap();

        bus.publish("b", Message::execute(SagaId::new(), StepId::new()))
            .await
            .unwrap();

        // Give any stray delivery a chance to land.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_handler_does_not_block_publisher() {
        let bus = InMemoryPubSub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let slow: MessageHandler = Arc::new(move |message| {
            let tx = tx.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                let _ = tx.send(message);
            })
        });
        bus.subscribe("topic", slow).await.unwrap();

        let start = std::time::Instant::now();
        bus.publish("topic", Message::execute(SagaId::new(), StepId::new()))
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));

        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn close_stops_delivery() {
        let bus = InMemoryPubSub::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        bus.subscribe("topic", channel_handler(tx)).await.unwrap();

        bus.close().await.unwrap();

        let result = bus
            .publish("topic", Message::execute(SagaId::new(), StepId::new()))
            .await;
        assert!(matches!(result, Err(PubSubError::Closed)));

        let (tx2, _rx2) = mpsc::unbounded_channel();
        let result = bus.subscribe("topic", channel_handler(tx2)).await;
        assert!(matches!(result, Err(PubSubError::Closed)));
        assert_eq!(bus.subscriber_count("topic").await, 0);
    }
}
