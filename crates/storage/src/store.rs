use std::time::Duration;

use async_trait::async_trait;
use common::{SagaId, StepId};

use crate::model::{Saga, Step};
use crate::Result;

/// Persistence contract for sagas and steps.
///
/// Implementations must be thread-safe and usable concurrently by any
/// number of orchestrator instances. Writes to a single step are expected
/// to be serializable (no lost updates between two writers touching the
/// same step ID); the engine tolerates weaker guarantees by gating every
/// forward execution on the step's `Pending` status.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upserts the saga together with all of its steps, atomically with
    /// respect to concurrent readers, and stamps `updated_at`.
    async fn save_saga(&self, saga: &Saga) -> Result<()>;

    /// Retrieves a saga by ID.
    async fn get_saga(&self, id: SagaId) -> Result<Saga>;

    /// Upserts a single step and propagates the change into the owning
    /// saga's embedded step sequence, so `get_saga` stays consistent.
    async fn update_step(&self, step: &Step) -> Result<()>;

    /// Retrieves a step by ID.
    async fn get_step(&self, id: StepId) -> Result<Step>;

    /// Returns all steps currently in `Pending` status.
    async fn get_pending_steps(&self) -> Result<Vec<Step>>;

    /// Returns steps considered stuck relative to `timeout`:
    /// - `Pending` with `updated_at` older than `now - timeout`, or
    /// - `Processing` with a non-null `started_at` older than `now - timeout`.
    async fn get_stuck_steps(&self, timeout: Duration) -> Result<Vec<Step>>;
}
