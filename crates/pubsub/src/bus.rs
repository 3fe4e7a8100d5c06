use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::message::Message;
use crate::Result;

/// Subscriber callback, invoked once per published message.
///
/// Handlers run on their own tasks; a slow handler must never be able to
/// block the publisher or other subscribers.
pub type MessageHandler = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// Topic-based broadcast transport for saga control messages.
///
/// Delivery is best-effort: no ordering guarantee is required across
/// messages, publishing to a topic with zero subscribers succeeds, and a
/// lost message is eventually re-driven by the recovery loop.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Broadcasts `message` to every subscriber of `topic`.
    async fn publish(&self, topic: &str, message: Message) -> Result<()>;

    /// Registers `handler` for every future message on `topic`.
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<()>;

    /// Stops delivery and drops all subscriptions.
    async fn close(&self) -> Result<()>;
}
