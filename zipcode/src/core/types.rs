//! Shared deterministic types for execution results.

use serde::{Deserialize, Serialize};

use crate::core::plan::StepId;

/// Outcome of executing one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ExecutionResult {
    /// The underlying action is confirmed complete.
    Succeeded,
    /// The action raised an error.
    Failed { cause: String },
    /// An external cancellation preempted the action.
    Cancelled,
}

impl ExecutionResult {
    pub fn failed(cause: impl Into<String>) -> Self {
        Self::Failed {
            cause: cause.into(),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Execution result recorded for a step that was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: StepId,
    #[serde(flatten)]
    pub result: ExecutionResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_outcome_serializes_flat() {
        let outcome = StepOutcome {
            step_id: 3,
            result: ExecutionResult::failed("disk full"),
        };
        let json = serde_json::to_string(&outcome).expect("serialize");
        assert_eq!(json, r#"{"step_id":3,"result":"failed","cause":"disk full"}"#);
    }
}
