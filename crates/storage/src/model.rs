//! Persisted data model for sagas and their steps.

use chrono::{DateTime, Utc};
use common::{SagaId, StepData, StepId};
use serde::{Deserialize, Serialize};

/// Lifecycle status shared by sagas and steps.
///
/// Step transitions are restricted to the following graph:
/// ```text
/// Pending ──► Processing ──┬──► Completed ──► Compensated
///    ▲                     └──► Failed
///    └───── Processing (recovery reset only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Not yet picked up by any executor.
    Pending,
    /// An executor has claimed the work and is running the handler.
    Processing,
    /// The forward action finished successfully.
    Completed,
    /// The forward action returned an error (terminal).
    Failed,
    /// The compensating action ran after a saga failure (terminal).
    Compensated,
}

impl Status {
    /// Returns true if no further forward progress is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Compensated)
    }

    /// Returns true if `next` is a legal step transition from this status.
    ///
    /// `Processing → Pending` is the recovery reset; everything else
    /// follows the forward/compensation paths.
    pub fn can_transition_to(&self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Pending, Status::Processing)
                | (Status::Processing, Status::Completed)
                | (Status::Processing, Status::Failed)
                | (Status::Processing, Status::Pending)
                | (Status::Completed, Status::Compensated)
        )
    }

    /// Returns the lowercase wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Compensated => "compensated",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of work in a saga: a forward action plus its compensator,
/// addressed by the logical step name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub saga_id: SagaId,
    /// Logical name used to look up a handler in the executing process.
    pub name: String,
    pub status: Status,
    /// Per-step scratch space; replaced with the merged execution data
    /// when the step completes.
    #[serde(default)]
    pub data: StepData,
    /// Human-readable error text, set on forward or compensation failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the step enters `Processing`; cleared by recovery resets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Step {
    /// Creates a fresh pending step owned by `saga_id`.
    pub fn new(saga_id: SagaId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: StepId::new(),
            saga_id,
            name: name.into(),
            status: Status::Pending,
            data: StepData::new(),
            error: None,
            started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Claims the step for execution.
    pub fn mark_processing(&mut self) {
        self.status = Status::Processing;
        self.started_at = Some(Utc::now());
    }

    /// Records a successful forward action and its resulting data.
    pub fn mark_completed(&mut self, data: StepData) {
        self.status = Status::Completed;
        self.data = data;
    }

    /// Records a failed forward action.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = Status::Failed;
        self.error = Some(error.into());
    }

    /// Records that the compensator ran for this step.
    pub fn mark_compensated(&mut self) {
        self.status = Status::Compensated;
    }

    /// Recovery reset: returns the step to the pending pool so another
    /// executor can claim it.
    pub fn reset_to_pending(&mut self) {
        self.status = Status::Pending;
        self.started_at = None;
    }
}

/// An ordered sequence of steps composing one distributed transaction.
///
/// The step sequence is append-only once the saga is saved; its order is
/// the execution order. The saga stays `Pending` until it reaches a
/// terminal `Completed` or `Failed` status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Saga {
    pub id: SagaId,
    /// Logical saga name, informational only.
    pub name: String,
    pub status: Status,
    pub steps: Vec<Step>,
    /// Shared saga context merged into each step's execution data.
    #[serde(default)]
    pub data: StepData,
    /// Terminal failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Saga {
    /// Creates a new pending saga with no steps.
    pub fn new(name: impl Into<String>, data: StepData) -> Self {
        let now = Utc::now();
        Self {
            id: SagaId::new(),
            name: name.into(),
            status: Status::Pending,
            steps: Vec::new(),
            data,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends a fresh pending step and returns its ID.
    ///
    /// Appending is the only way to grow the sequence; steps are never
    /// removed or reordered.
    pub fn add_step(&mut self, name: impl Into<String>) -> StepId {
        let step = Step::new(self.id, name);
        let id = step.id;
        self.steps.push(step);
        id
    }

    /// Length of the contiguous completed prefix of the step sequence.
    ///
    /// This is the continuation cursor: the saga only advances past steps
    /// that are completed with no gaps before them, which makes the scan
    /// robust to out-of-order message delivery.
    pub fn completed_prefix(&self) -> usize {
        self.steps
            .iter()
            .take_while(|step| step.status == Status::Completed)
            .count()
    }

    /// Builds the execution data for a step: saga-level context with the
    /// step's own data merged on top (step overrides saga on conflict).
    pub fn execution_data(&self, step: &Step) -> StepData {
        let mut merged = self.data.clone();
        merged.extend(step.data.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}
