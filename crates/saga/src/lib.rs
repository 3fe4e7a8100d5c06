//! Saga pattern implementation for multi-step distributed transactions.
//!
//! A saga is an ordered sequence of steps, each with a forward action and a
//! compensating action. If any forward action fails, previously completed
//! steps are rolled back in reverse order by publishing compensation
//! messages. All progress is persisted through the [`storage::Storage`]
//! contract, and work is shipped between cooperating processes over the
//! [`pubsub::PubSub`] contract, so a saga survives process crashes and can
//! be resumed by any instance.
//!
//! The two moving parts:
//! - [`Orchestrator`] hosts the handler registry, creates sagas, and
//!   drives the step state machine in response to control messages.
//! - [`RecoveryManager`] periodically reclaims steps abandoned by dead
//!   processes and republishes them.
//!
//! Execution is at-least-once: two instances can race on the same pending
//! step, so handlers must be idempotent. That is the central contract a
//! caller accepts.

pub mod builder;
pub mod error;
pub mod handler;
pub mod orchestrator;
pub mod recovery;

pub use builder::SagaBuilder;
pub use error::{Result, SagaError};
pub use handler::{FnHandler, HandlerError, StepHandler};
pub use orchestrator::Orchestrator;
pub use recovery::{RecoveryConfig, RecoveryManager};
