use serde::{Deserialize, Serialize};
use std::fmt;

/// Run state of a delegated operation document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Waiting for a batch driver to pick it up
    Queued,
    /// Claimed by a driver, operator is executing
    Running,
    /// Operator finished and returned a result
    Completed,
    /// Resolution or execution failed
    Failed,
}

impl RunState {
    pub const ALL: [RunState; 4] = [
        RunState::Queued,
        RunState::Running,
        RunState::Completed,
        RunState::Failed,
    ];

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if this is an active state (operation is being executed)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether moving from `self` to `target` respects the document lifecycle.
    ///
    /// Queued documents may fail without ever running when their operator
    /// cannot be resolved. Terminal states only lead to new documents via rerun.
    pub fn can_transition_to(&self, target: RunState) -> bool {
        matches!(
            (self, target),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid run state: {s}")),
        }
    }
}

/// Default state for newly queued operations
impl Default for RunState {
    fn default() -> Self {
        Self::Queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_terminal_check() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Queued.is_terminal());
        assert!(!RunState::Running.is_terminal());
    }

    #[test]
    fn test_valid_transitions() {
        assert!(RunState::Queued.can_transition_to(RunState::Running));
        assert!(RunState::Queued.can_transition_to(RunState::Failed));
        assert!(RunState::Running.can_transition_to(RunState::Completed));
        assert!(RunState::Running.can_transition_to(RunState::Failed));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in [RunState::Completed, RunState::Failed] {
            for to in RunState::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} should be rejected");
            }
        }
    }

    #[test]
    fn test_no_backwards_transitions() {
        assert!(!RunState::Running.can_transition_to(RunState::Queued));
        assert!(!RunState::Queued.can_transition_to(RunState::Completed));
        assert!(!RunState::Queued.can_transition_to(RunState::Queued));
    }

    #[test]
    fn test_state_string_conversion() {
        assert_eq!(RunState::Running.to_string(), "running");
        assert_eq!("completed".parse::<RunState>().unwrap(), RunState::Completed);
        assert!("in_progress".parse::<RunState>().is_err());
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&RunState::Queued).unwrap();
        assert_eq!(json, "\"queued\"");

        let parsed: RunState = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, RunState::Failed);
    }
}
