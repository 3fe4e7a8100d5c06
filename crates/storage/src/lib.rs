//! Durable state for sagas and steps.
//!
//! This crate defines the persistence contract the orchestration engine
//! relies on: the [`Storage`] trait, the persisted data model ([`Saga`],
//! [`Step`], [`Status`]), and an in-memory reference implementation used
//! by the test suites.
//!
//! Storage exclusively owns durable state. The saga and step values passed
//! around the engine are snapshots; every mutation must be written back
//! through the [`Storage`] contract.

pub mod error;
pub mod memory;
pub mod model;
pub mod store;

pub use common::{SagaId, StepData, StepId};
pub use error::{Result, StorageError};
pub use memory::InMemoryStorage;
pub use model::{Saga, Status, Step};
pub use store::Storage;
