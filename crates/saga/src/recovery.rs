//! Background re-drive of stalled steps.

use std::sync::Mutex;
use std::time::Duration;

use pubsub::{Message, PubSub, SAGA_EVENTS};
use storage::{Status, Storage};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Recovery loop tuning.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// How often storage is scanned for stuck steps.
    pub interval: Duration,
    /// Age past which a pending or processing step counts as stuck.
    pub step_timeout: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            step_timeout: Duration::from_secs(10),
        }
    }
}

/// Detects steps that stalled, either never picked up or picked up by a
/// process that died, and republishes their execution messages.
///
/// Recovery is eventually consistent. Several managers may run against the
/// same storage; duplicate republishes are absorbed by the orchestrator's
/// pending-status guard.
pub struct RecoveryManager<S, P> {
    storage: S,
    pubsub: P,
    config: RecoveryConfig,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl<S, P> RecoveryManager<S, P>
where
    S: Storage + Clone + 'static,
    P: PubSub + Clone + 'static,
{
    /// Creates a manager with the default scan interval and step timeout.
    pub fn new(storage: S, pubsub: P) -> Self {
        Self::with_config(storage, pubsub, RecoveryConfig::default())
    }

    /// Creates a manager with explicit tuning.
    pub fn with_config(storage: S, pubsub: P, config: RecoveryConfig) -> Self {
        Self {
            storage,
            pubsub,
            config,
            shutdown: Mutex::new(None),
        }
    }

    /// True while the scan task is running.
    pub fn is_running(&self) -> bool {
        self.shutdown.lock().unwrap().is_some()
    }

    /// Launches the periodic scan task. Idempotent: a second call while
    /// running does nothing. Must be called within a tokio runtime.
    pub fn start(&self) {
        let mut shutdown = self.shutdown.lock().unwrap();
        if shutdown.is_some() {
            return;
        }

        let (tx, mut rx) = watch::channel(false);
        *shutdown = Some(tx);

        let storage = self.storage.clone();
        let pubsub = self.pubsub.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = rx.changed() => break,
                    _ = ticker.tick() => {
                        recover_stuck_steps(&storage, &pubsub, config.step_timeout).await;
                    }
                }
            }
            tracing::debug!("recovery loop stopped");
        });
    }

    /// Signals the scan task to exit. Idempotent, does not wait.
    pub fn stop(&self) {
        let mut shutdown = self.shutdown.lock().unwrap();
        if let Some(tx) = shutdown.take() {
            let _ = tx.send(true);
        }
    }
}

/// One scan pass: reclaim abandoned processing steps and republish every
/// stuck step. Individual failures are logged and skipped; the next tick
/// retries.
async fn recover_stuck_steps<S: Storage, P: PubSub>(storage: &S, pubsub: &P, timeout: Duration) {
    let stuck = match storage.get_stuck_steps(timeout).await {
        Ok(steps) => steps,
        Err(err) => {
            tracing::warn!(error = %err, "failed to query stuck steps");
            return;
        }
    };

    for mut step in stuck {
        if step.status == Status::Processing {
            // The executor that claimed this step is presumed dead; return
            // the step to the pending pool before republishing.
            step.reset_to_pending();
            if let Err(err) = storage.update_step(&step).await {
                tracing::warn!(step_id = %step.id, error = %err, "failed to reset stuck step");
                continue;
            }
        }

        tracing::info!(
            step_id = %step.id,
            saga_id = %step.saga_id,
            step = %step.name,
            "republishing stuck step"
        );
        if let Err(err) = pubsub
            .publish(SAGA_EVENTS, Message::execute(step.saga_id, step.id))
            .await
        {
            tracing::warn!(step_id = %step.id, error = %err, "failed to republish stuck step");
            continue;
        }
        metrics::counter!("saga_recovery_republished_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::StepData;
    use pubsub::{InMemoryPubSub, MessageHandler, MessageKind};
    use std::sync::Arc;
    use storage::{InMemoryStorage, Saga};
    use tokio::sync::mpsc;

    async fn capture_messages(bus: &InMemoryPubSub) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: MessageHandler = Arc::new(move |message| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(message);
            })
        });
        bus.subscribe(SAGA_EVENTS, handler).await.unwrap();
        rx
    }

    async fn saga_with_step(storage: &InMemoryStorage) -> Saga {
        let mut saga = Saga::new("recovering", StepData::new());
        saga.add_step("work");
        storage.save_saga(&saga).await.unwrap();
        storage.get_saga(saga.id).await.unwrap()
    }

    #[tokio::test]
    async fn scan_republishes_stuck_pending_step() {
        let storage = InMemoryStorage::new();
        let bus = InMemoryPubSub::new();
        let mut rx = capture_messages(&bus).await;
        let saga = saga_with_step(&storage).await;

        recover_stuck_steps(&storage, &bus, Duration::ZERO).await;

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.kind, MessageKind::StepExecute);
        assert_eq!(msg.step_id, saga.steps[0].id);

        // A pending step is republished without being touched.
        let step = storage.get_step(saga.steps[0].id).await.unwrap();
        assert_eq!(step.status, Status::Pending);
    }

    #[tokio::test]
    async fn scan_resets_abandoned_processing_step_before_republish() {
        let storage = InMemoryStorage::new();
        let bus = InMemoryPubSub::new();
        let mut rx = capture_messages(&bus).await;
        let saga = saga_with_step(&storage).await;

        let mut step = saga.steps[0].clone();
        step.mark_processing();
        storage.update_step(&step).await.unwrap();

        recover_stuck_steps(&storage, &bus, Duration::ZERO).await;

        let recovered = storage.get_step(step.id).await.unwrap();
        assert_eq!(recovered.status, Status::Pending);
        assert!(recovered.started_at.is_none());

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.kind, MessageKind::StepExecute);
        assert_eq!(msg.step_id, step.id);
    }

    #[tokio::test]
    async fn scan_leaves_fresh_steps_alone() {
        let storage = InMemoryStorage::new();
        let bus = InMemoryPubSub::new();
        let mut rx = capture_messages(&bus).await;
        saga_with_step(&storage).await;

        recover_stuck_steps(&storage, &bus, Duration::from_secs(60)).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let manager = RecoveryManager::new(InMemoryStorage::new(), InMemoryPubSub::new());
        assert!(!manager.is_running());

        manager.start();
        manager.start();
        assert!(manager.is_running());

        manager.stop();
        manager.stop();
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn manager_can_be_restarted_after_stop() {
        let manager = RecoveryManager::new(InMemoryStorage::new(), InMemoryPubSub::new());
        manager.start();
        manager.stop();
        manager.start();
        assert!(manager.is_running());
        manager.stop();
    }

    #[tokio::test]
    async fn running_loop_republishes_on_its_own() {
        let storage = InMemoryStorage::new();
        let bus = InMemoryPubSub::new();
        let mut rx = capture_messages(&bus).await;
        saga_with_step(&storage).await;

        let manager = RecoveryManager::with_config(
            storage,
            bus,
            RecoveryConfig {
                interval: Duration::from_millis(20),
                step_timeout: Duration::ZERO,
            },
        );
        manager.start();

        let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no republish before timeout")
            .unwrap();
        assert_eq!(msg.kind, MessageKind::StepExecute);

        manager.stop();
    }
}
