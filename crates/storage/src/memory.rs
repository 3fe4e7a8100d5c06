use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{SagaId, StepId};
use tokio::sync::RwLock;

use crate::model::{Saga, Status, Step};
use crate::store::Storage;
use crate::{Result, StorageError};

#[derive(Debug, Default)]
struct State {
    sagas: HashMap<SagaId, Saga>,
    steps: HashMap<StepId, Step>,
}

/// In-memory storage implementation for tests and single-process use.
///
/// Keeps sagas and steps in two maps behind one lock, which makes
/// `save_saga` trivially atomic with respect to readers.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<RwLock<State>>,
}

impl InMemoryStorage {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored sagas.
    pub async fn saga_count(&self) -> usize {
        self.state.read().await.sagas.len()
    }

    /// Clears all sagas and steps.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.sagas.clear();
        state.steps.clear();
    }
}

/// True when `ts` lies more than `timeout` in the past.
fn older_than(ts: DateTime<Utc>, now: DateTime<Utc>, timeout: Duration) -> bool {
    now.signed_duration_since(ts)
        .to_std()
        .is_ok_and(|age| age > timeout)
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn save_saga(&self, saga: &Saga) -> Result<()> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let mut saga = saga.clone();
        saga.updated_at = now;
        for step in &mut saga.steps {
            step.updated_at = now;
            state.steps.insert(step.id, step.clone());
        }
        state.sagas.insert(saga.id, saga);

        Ok(())
    }

    async fn get_saga(&self, id: SagaId) -> Result<Saga> {
        let state = self.state.read().await;
        state
            .sagas
            .get(&id)
            .cloned()
            .ok_or(StorageError::SagaNotFound(id))
    }

    async fn update_step(&self, step: &Step) -> Result<()> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let mut step = step.clone();
        step.updated_at = now;

        if let Some(saga) = state.sagas.get_mut(&step.saga_id) {
            if let Some(slot) = saga.steps.iter_mut().find(|s| s.id == step.id) {
                *slot = step.clone();
            }
            saga.updated_at = now;
        }
        state.steps.insert(step.id, step);

        Ok(())
    }

    async fn get_step(&self, id: StepId) -> Result<Step> {
        let state = self.state.read().await;
        state
            .steps
            .get(&id)
            .cloned()
            .ok_or(StorageError::StepNotFound(id))
    }

    async fn get_pending_steps(&self) -> Result<Vec<Step>> {
        let state = self.state.read().await;
        Ok(state
            .steps
            .values()
            .filter(|step| step.status == Status::Pending)
            .cloned()
            .collect())
    }

    async fn get_stuck_steps(&self, timeout: Duration) -> Result<Vec<Step>> {
        let state = self.state.read().await;
        let now = Utc::now();

        Ok(state
            .steps
            .values()
            .filter(|step| match step.status {
                // Never picked up by any executor.
                Status::Pending => older_than(step.updated_at, now, timeout),
                // Picked up, but the executor presumably died.
                Status::Processing => step
                    .started_at
                    .is_some_and(|started| older_than(started, now, timeout)),
                _ => false,
            })
            .cloned()
            .collect())
    }
}
