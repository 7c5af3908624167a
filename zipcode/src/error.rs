//! Error kinds surfaced by the runtime and its capability providers.

use thiserror::Error;

use crate::core::plan::StepId;
use crate::core::status::RuntimeStatus;

/// Failure of a capability provider call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Backend unreachable, non-2xx status, or the call timed out.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The backend answered, but not with a usable text block.
    #[error("malformed provider response: {0}")]
    Response(String),
}

impl ProviderError {
    pub fn is_transport(&self) -> bool {
        matches!(self, ProviderError::Transport(_))
    }
}

/// Reasons a run ends `Failed`, plus the contract violation of starting a
/// run while another is active.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("transport failure: {0}")]
    TransportFailure(String),
    #[error("malformed classification: {0}")]
    ClassificationMalformed(String),
    #[error("planning failed: {0}")]
    PlanningFailed(String),
    #[error("step {step_id} blocked: {reason}")]
    ValidationBlocked { step_id: StepId, reason: String },
    #[error("step {step_id} failed: {cause}")]
    ExecutionFailed { step_id: StepId, cause: String },
    #[error("runtime is {status}, expected idle")]
    InvalidRuntimeState { status: RuntimeStatus },
}

impl RuntimeError {
    /// Step that halted the run, if the error is tied to one.
    pub fn step_id(&self) -> Option<StepId> {
        match self {
            RuntimeError::ValidationBlocked { step_id, .. }
            | RuntimeError::ExecutionFailed { step_id, .. } => Some(*step_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_step() {
        let err = RuntimeError::ExecutionFailed {
            step_id: 4,
            cause: "exit status 1".to_string(),
        };
        assert_eq!(err.to_string(), "step 4 failed: exit status 1");
        assert_eq!(err.step_id(), Some(4));
    }

    #[test]
    fn invalid_state_names_the_status() {
        let err = RuntimeError::InvalidRuntimeState {
            status: RuntimeStatus::Running,
        };
        assert_eq!(err.to_string(), "runtime is running, expected idle");
        assert_eq!(err.step_id(), None);
    }
}
