//! Runtime lifecycle states and the legal transitions between them.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeStatus {
    #[default]
    Idle,
    Planning,
    Validating,
    Running,
    /// Running, suspended on a step that needs external approval.
    AwaitingApproval,
    Succeeded,
    Failed,
    Cancelled,
}

impl RuntimeStatus {
    /// Succeeded, Failed and Cancelled end a run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RuntimeStatus::Succeeded | RuntimeStatus::Failed | RuntimeStatus::Cancelled
        )
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: RuntimeStatus) -> bool {
        use RuntimeStatus::{
            AwaitingApproval, Cancelled, Failed, Idle, Planning, Running, Succeeded, Validating,
        };
        match (self, next) {
            (Idle, Planning) => true,
            (Planning, Validating | Failed | Cancelled) => true,
            (Validating, Running | Failed | Cancelled) => true,
            (Running, AwaitingApproval | Succeeded | Failed | Cancelled) => true,
            (AwaitingApproval, Running | Failed | Cancelled) => true,
            (Succeeded | Failed | Cancelled, Idle) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuntimeStatus::Idle => "idle",
            RuntimeStatus::Planning => "planning",
            RuntimeStatus::Validating => "validating",
            RuntimeStatus::Running => "running",
            RuntimeStatus::AwaitingApproval => "awaiting_approval",
            RuntimeStatus::Succeeded => "succeeded",
            RuntimeStatus::Failed => "failed",
            RuntimeStatus::Cancelled => "cancelled",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::RuntimeStatus::{
        AwaitingApproval, Cancelled, Failed, Idle, Planning, Running, Succeeded, Validating,
    };

    #[test]
    fn happy_path_is_legal() {
        let path = [Idle, Planning, Validating, Running, Succeeded, Idle];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn approval_suspension_returns_to_running() {
        assert!(Running.can_transition_to(AwaitingApproval));
        assert!(AwaitingApproval.can_transition_to(Running));
        assert!(AwaitingApproval.can_transition_to(Cancelled));
    }

    #[test]
    fn validating_cannot_succeed_directly() {
        assert!(!Validating.can_transition_to(Succeeded));
        assert!(!Planning.can_transition_to(Running));
    }

    #[test]
    fn terminal_states_only_reset_to_idle() {
        for terminal in [Succeeded, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            assert!(terminal.can_transition_to(Idle));
            assert!(!terminal.can_transition_to(Planning));
        }
    }

    #[test]
    fn idle_only_starts_planning() {
        assert!(!Idle.is_terminal());
        assert!(!Idle.can_transition_to(Running));
        assert!(!Idle.can_transition_to(Idle));
    }
}
