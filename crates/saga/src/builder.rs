//! Inline saga definition with automatic handler registration.

use std::sync::Arc;

use common::StepData;
use pubsub::PubSub;
use storage::{Saga, Storage};

use crate::error::Result;
use crate::handler::StepHandler;
use crate::orchestrator::Orchestrator;

/// Fluent saga construction: chain steps with their handlers inline, seed
/// shared context, then [`execute`](SagaBuilder::execute).
///
/// Every chained handler is registered on the orchestrator before the saga
/// starts, so the building process can execute all of its own steps.
pub struct SagaBuilder<S, P> {
    name: String,
    steps: Vec<(String, Arc<dyn StepHandler>)>,
    data: StepData,
    orchestrator: Orchestrator<S, P>,
}

impl<S, P> SagaBuilder<S, P>
where
    S: Storage + Clone + 'static,
    P: PubSub + Clone + 'static,
{
    /// Starts a builder for a saga with the given logical name.
    pub fn new(name: impl Into<String>, orchestrator: &Orchestrator<S, P>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            data: StepData::new(),
            orchestrator: orchestrator.clone(),
        }
    }

    /// Appends a step with its handler. Steps execute in chaining order.
    pub fn step(mut self, name: impl Into<String>, handler: impl StepHandler + 'static) -> Self {
        self.steps.push((name.into(), Arc::new(handler)));
        self
    }

    /// Adds an entry to the shared saga context.
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Registers all chained handlers and starts the saga.
    ///
    /// A builder with no steps is rejected with
    /// [`SagaError::EmptySaga`](crate::SagaError::EmptySaga).
    pub async fn execute(self) -> Result<Saga> {
        let Self {
            name,
            steps,
            data,
            orchestrator,
        } = self;

        let mut step_names = Vec::with_capacity(steps.len());
        for (step_name, handler) in steps {
            orchestrator.register_handler(step_name.clone(), handler);
            step_names.push(step_name);
        }

        orchestrator.start_saga(name, &step_names, data).await
    }
}
