//! The user-code seam: step handlers.

use async_trait::async_trait;
use common::StepData;
use futures_util::future::BoxFuture;
use thiserror::Error;

/// Error returned by a handler's forward or compensating action.
///
/// The engine never matches on handler errors; only the display text is
/// recorded on the step.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Creates a handler error from a human-readable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

/// Forward and compensating actions for one step name.
///
/// Handlers receive the merged execution data (saga context with step data
/// on top) by value and, on successful execution, return it so mutations
/// are persisted back into the step and saga.
///
/// Execution is at-least-once: the same input may be delivered to a
/// handler more than once, so both actions must be idempotent. Compensators
/// may additionally run in any order relative to each other.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Runs the forward action, returning the possibly modified data.
    async fn execute(&self, data: StepData) -> Result<StepData, HandlerError>;

    /// Runs the compensating action.
    async fn compensate(&self, data: StepData) -> Result<(), HandlerError>;
}

type ExecuteFn = Box<dyn Fn(StepData) -> BoxFuture<'static, Result<StepData, HandlerError>> + Send + Sync>;
type CompensateFn = Box<dyn Fn(StepData) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// Closure-backed [`StepHandler`] for inline step definitions.
///
/// A missing action is a successful no-op, for steps that need nothing
/// done on one of the two paths.
#[derive(Default)]
pub struct FnHandler {
    execute_fn: Option<ExecuteFn>,
    compensate_fn: Option<CompensateFn>,
}

impl FnHandler {
    /// Creates a handler from a forward and a compensating closure.
    pub fn new<E, C>(execute: E, compensate: C) -> Self
    where
        E: Fn(StepData) -> BoxFuture<'static, Result<StepData, HandlerError>>
            + Send
            + Sync
            + 'static,
        C: Fn(StepData) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync + 'static,
    {
        Self {
            execute_fn: Some(Box::new(execute)),
            compensate_fn: Some(Box::new(compensate)),
        }
    }

    /// Creates a handler with a forward action only; compensation is a
    /// no-op.
    pub fn execute_only<E>(execute: E) -> Self
    where
        E: Fn(StepData) -> BoxFuture<'static, Result<StepData, HandlerError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            execute_fn: Some(Box::new(execute)),
            compensate_fn: None,
        }
    }
}

#[async_trait]
impl StepHandler for FnHandler {
    async fn execute(&self, data: StepData) -> Result<StepData, HandlerError> {
        match &self.execute_fn {
            Some(f) => f(data).await,
            None => Ok(data),
        }
    }

    async fn compensate(&self, data: StepData) -> Result<(), HandlerError> {
        match &self.compensate_fn {
            Some(f) => f(data).await,
            None => Ok(()),
        }
    }
}
