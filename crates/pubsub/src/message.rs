use common::{SagaId, StepData, StepId};
use serde::{Deserialize, Serialize};

/// The single topic carrying all saga control messages.
pub const SAGA_EVENTS: &str = "saga_events";

/// Discriminates the two control operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Run the forward action of the addressed step.
    StepExecute,
    /// Run the compensating action of the addressed step.
    StepCompensate,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::StepExecute => write!(f, "step_execute"),
            MessageKind::StepCompensate => write!(f, "step_compensate"),
        }
    }
}

/// The pub/sub envelope.
///
/// The optional `data` payload is a snapshot of saga context at publish
/// time and is informational only; executors always reload authoritative
/// state from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub saga_id: SagaId,
    pub step_id: StepId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StepData>,
}

impl Message {
    /// Builds a `step_execute` message for the addressed step.
    pub fn execute(saga_id: SagaId, step_id: StepId) -> Self {
        Self {
            kind: MessageKind::StepExecute,
            saga_id,
            step_id,
            data: None,
        }
    }

    /// Builds a `step_compensate` message for the addressed step.
    pub fn compensate(saga_id: SagaId, step_id: StepId) -> Self {
        Self {
            kind: MessageKind::StepCompensate,
            saga_id,
            step_id,
            data: None,
        }
    }

    /// Attaches an informational data snapshot.
    pub fn with_data(mut self, data: StepData) -> Self {
        self.data = Some(data);
        self
    }
}
