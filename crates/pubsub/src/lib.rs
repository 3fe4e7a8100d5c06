//! Control-plane messaging between orchestrator instances.
//!
//! A single topic, [`SAGA_EVENTS`], carries every control message. The
//! payload on a message is informational; the authoritative saga state
//! always lives in storage, so transports are free to drop, duplicate, or
//! reorder deliveries. The engine's idempotency guard and the recovery
//! loop absorb all three.

pub mod bus;
pub mod error;
pub mod memory;
pub mod message;

pub use bus::{MessageHandler, PubSub};
pub use error::{PubSubError, Result};
pub use memory::InMemoryPubSub;
pub use message::{Message, MessageKind, SAGA_EVENTS};
