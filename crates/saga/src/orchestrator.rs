//! The saga state machine driver.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use common::{SagaId, StepData, StepId};
use pubsub::{Message, MessageHandler, MessageKind, PubSub, SAGA_EVENTS};
use storage::{Saga, Status, Step, Storage};

use crate::error::{Result, SagaError};
use crate::handler::StepHandler;

/// Drives saga execution: hosts the per-process handler registry, creates
/// sagas, and processes step control messages off the pub/sub bus.
///
/// The orchestrator holds no durable state of its own. Any number of
/// instances may run against the same storage and bus; an instance that
/// lacks the handler for a step simply fails to progress it, and the
/// recovery loop redelivers the step until an owning instance picks it up.
pub struct Orchestrator<S, P> {
    storage: S,
    pubsub: P,
    handlers: Arc<RwLock<HashMap<String, Arc<dyn StepHandler>>>>,
}

impl<S: Clone, P: Clone> Clone for Orchestrator<S, P> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            pubsub: self.pubsub.clone(),
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<S, P> Orchestrator<S, P>
where
    S: Storage + Clone + 'static,
    P: PubSub + Clone + 'static,
{
    /// Creates an orchestrator over the given collaborators.
    pub fn new(storage: S, pubsub: P) -> Self {
        Self {
            storage,
            pubsub,
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers the handler executing and compensating the named step in
    /// this process. Last registration wins.
    pub fn register_handler(&self, name: impl Into<String>, handler: Arc<dyn StepHandler>) {
        self.handlers.write().unwrap().insert(name.into(), handler);
    }

    fn handler_for(&self, name: &str) -> Option<Arc<dyn StepHandler>> {
        self.handlers.read().unwrap().get(name).cloned()
    }

    /// Creates a saga with one pending step per name, persists it, and
    /// publishes the execution message for step 0.
    ///
    /// The initial publish is best-effort; a lost message is re-driven by
    /// recovery. Only an empty step list or a storage failure is an error.
    #[tracing::instrument(skip_all)]
    pub async fn start_saga(
        &self,
        name: impl Into<String>,
        step_names: &[impl AsRef<str>],
        data: StepData,
    ) -> Result<Saga> {
        if step_names.is_empty() {
            return Err(SagaError::EmptySaga);
        }

        let mut saga = Saga::new(name, data);
        for step_name in step_names {
            saga.add_step(step_name.as_ref());
        }
        self.storage.save_saga(&saga).await?;

        metrics::counter!("saga_started_total").increment(1);
        tracing::info!(saga_id = %saga.id, name = %saga.name, steps = saga.steps.len(), "saga started");

        let first = &saga.steps[0];
        self.publish_best_effort(Message::execute(saga.id, first.id).with_data(saga.data.clone()))
            .await;

        Ok(saga)
    }

    /// Forward-path transition for one step.
    ///
    /// A step whose status is no longer `Pending` is skipped; this is the
    /// idempotency guard that absorbs duplicate and recovered deliveries.
    #[tracing::instrument(skip(self))]
    pub async fn execute_step(&self, step_id: StepId) -> Result<()> {
        let mut step = self.storage.get_step(step_id).await?;

        if step.status != Status::Pending {
            tracing::debug!(status = %step.status, "step already claimed, skipping");
            return Ok(());
        }

        // Look up the handler before claiming the step, so a process that
        // cannot execute it leaves the step pending for another instance.
        let Some(handler) = self.handler_for(&step.name) else {
            return Err(SagaError::MissingHandler(step.name));
        };

        step.mark_processing();
        self.storage.update_step(&step).await?;

        let saga = self.storage.get_saga(step.saga_id).await?;
        let exec_data = saga.execution_data(&step);

        let started = Instant::now();
        let outcome = handler.execute(exec_data).await;
        metrics::histogram!("saga_step_duration_seconds").record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(data) => {
                metrics::counter!("saga_step_executions_total").increment(1);
                step.mark_completed(data.clone());
                self.storage.update_step(&step).await?;

                // Reload so the continuation scan sees the step just written.
                let mut saga = self.storage.get_saga(step.saga_id).await?;
                saga.data.extend(data);
                self.storage.save_saga(&saga).await?;

                self.continue_or_complete(&saga).await;
            }
            Err(err) => {
                metrics::counter!("saga_step_failures_total").increment(1);
                tracing::warn!(step = %step.name, error = %err, "step handler failed");
                step.mark_failed(err.to_string());
                self.storage.update_step(&step).await?;

                self.start_compensation(&step).await?;
            }
        }

        Ok(())
    }

    /// Reverse-path transition for one step.
    ///
    /// Only a `Completed` step is compensated. Compensation is best-effort:
    /// a compensator error is recorded on the step, which is still marked
    /// `Compensated`.
    #[tracing::instrument(skip(self))]
    pub async fn compensate_step(&self, step_id: StepId) -> Result<()> {
        let mut step = self.storage.get_step(step_id).await?;

        if step.status != Status::Completed {
            tracing::debug!(status = %step.status, "nothing to compensate, skipping");
            return Ok(());
        }

        let Some(handler) = self.handler_for(&step.name) else {
            return Err(SagaError::MissingHandler(step.name));
        };

        let saga = self.storage.get_saga(step.saga_id).await?;
        let exec_data = saga.execution_data(&step);

        if let Err(err) = handler.compensate(exec_data).await {
            tracing::warn!(step = %step.name, error = %err, "compensation handler failed");
            step.error = Some(err.to_string());
        }

        step.mark_compensated();
        self.storage.update_step(&step).await?;
        metrics::counter!("saga_step_compensations_total").increment(1);
        tracing::info!(saga_id = %step.saga_id, step = %step.name, "step compensated");

        Ok(())
    }

    /// Subscribes this instance to the saga control topic.
    ///
    /// Message-processing errors are logged and absorbed here; the persisted
    /// step status plus the recovery loop carry the outcome, not return
    /// values.
    pub async fn start_listener(&self) -> Result<()> {
        let orchestrator = self.clone();
        let handler: MessageHandler = Arc::new(move |message| {
            let orchestrator = orchestrator.clone();
            Box::pin(async move { orchestrator.dispatch(message).await })
        });
        self.pubsub.subscribe(SAGA_EVENTS, handler).await?;
        Ok(())
    }

    /// Retrieves a saga by ID.
    pub async fn get_saga(&self, id: SagaId) -> Result<Saga> {
        Ok(self.storage.get_saga(id).await?)
    }

    async fn dispatch(&self, message: Message) {
        let result = match message.kind {
            MessageKind::StepExecute => self.execute_step(message.step_id).await,
            MessageKind::StepCompensate => self.compensate_step(message.step_id).await,
        };
        if let Err(err) = result {
            tracing::warn!(
                kind = %message.kind,
                saga_id = %message.saga_id,
                step_id = %message.step_id,
                error = %err,
                "saga message processing failed"
            );
        }
    }

    /// Advances the saga after a successful forward step: publish the step
    /// after the contiguous completed prefix, or mark the saga completed.
    async fn continue_or_complete(&self, saga: &Saga) {
        let prefix = saga.completed_prefix();
        if prefix < saga.steps.len() {
            let next = &saga.steps[prefix];
            self.publish_best_effort(
                Message::execute(saga.id, next.id).with_data(saga.data.clone()),
            )
            .await;
        } else {
            let mut saga = saga.clone();
            saga.status = Status::Completed;
            if let Err(err) = self.storage.save_saga(&saga).await {
                tracing::warn!(saga_id = %saga.id, error = %err, "failed to persist completed saga");
                return;
            }
            metrics::counter!("saga_completed_total").increment(1);
            tracing::info!(saga_id = %saga.id, "saga completed");
        }
    }

    /// Marks the saga failed and publishes compensation messages for every
    /// completed step in reverse index order.
    ///
    /// The bus does not guarantee delivery order, so compensators must be
    /// commutative with respect to each other.
    async fn start_compensation(&self, failed: &Step) -> Result<()> {
        let mut saga = self.storage.get_saga(failed.saga_id).await?;
        saga.status = Status::Failed;
        saga.error = Some(format!(
            "step '{}' failed: {}",
            failed.name,
            failed.error.as_deref().unwrap_or("unknown error")
        ));
        self.storage.save_saga(&saga).await?;

        metrics::counter!("saga_failed_total").increment(1);
        tracing::warn!(saga_id = %saga.id, step = %failed.name, "saga failed, dispatching compensation");

        for step in saga.steps.iter().rev() {
            if step.status == Status::Completed {
                self.publish_best_effort(
                    Message::compensate(saga.id, step.id).with_data(saga.data.clone()),
                )
                .await;
            }
        }

        Ok(())
    }

    async fn publish_best_effort(&self, message: Message) {
        if let Err(err) = self.pubsub.publish(SAGA_EVENTS, message).await {
            tracing::warn!(error = %err, "failed to publish saga control message");
        }
    }
}
