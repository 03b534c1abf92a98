//! Submission state machine
//!
//! Phases: NOT_STARTED → RUNNING → {SUCCEEDED | FAILED}
//!
//! Standalone cluster submissions additionally track the driver through the
//! states reported by the master; see [`spark_log_classifier::DriverState`].

mod run_state;

pub use run_state::RunState;

use serde::{Deserialize, Serialize};

/// Check if a state is terminal (no further transitions possible)
pub trait TerminalState {
    fn is_terminal(&self) -> bool;
}

/// Lifecycle of one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionPhase {
    /// Hook constructed, nothing launched
    #[default]
    NotStarted,
    /// spark-submit launched, or the driver is being tracked
    Running,
    Succeeded,
    Failed,
}

impl TerminalState for SubmissionPhase {
    fn is_terminal(&self) -> bool {
        matches!(self, SubmissionPhase::Succeeded | SubmissionPhase::Failed)
    }
}

impl SubmissionPhase {
    /// Check if transition from this phase to target is valid
    pub fn can_transition_to(&self, target: SubmissionPhase) -> bool {
        match (self, target) {
            (SubmissionPhase::NotStarted, SubmissionPhase::Running) => true,
            // Launch failures never reach RUNNING
            (SubmissionPhase::NotStarted, SubmissionPhase::Failed) => true,

            (SubmissionPhase::Running, SubmissionPhase::Succeeded) => true,
            (SubmissionPhase::Running, SubmissionPhase::Failed) => true,

            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    #[error("Invalid phase transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: SubmissionPhase,
        to: SubmissionPhase,
    },

    #[error("Submission already in terminal phase {0:?}")]
    Terminal(SubmissionPhase),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(SubmissionPhase::NotStarted.can_transition_to(SubmissionPhase::Running));
        assert!(SubmissionPhase::NotStarted.can_transition_to(SubmissionPhase::Failed));
        assert!(SubmissionPhase::Running.can_transition_to(SubmissionPhase::Succeeded));
        assert!(SubmissionPhase::Running.can_transition_to(SubmissionPhase::Failed));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!SubmissionPhase::NotStarted.can_transition_to(SubmissionPhase::Succeeded));
        assert!(!SubmissionPhase::Succeeded.can_transition_to(SubmissionPhase::Running));
        assert!(!SubmissionPhase::Failed.can_transition_to(SubmissionPhase::Succeeded));
        assert!(!SubmissionPhase::Running.can_transition_to(SubmissionPhase::Running));
    }

    #[test]
    fn test_terminal_phases() {
        assert!(!SubmissionPhase::NotStarted.is_terminal());
        assert!(!SubmissionPhase::Running.is_terminal());
        assert!(SubmissionPhase::Succeeded.is_terminal());
        assert!(SubmissionPhase::Failed.is_terminal());
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&SubmissionPhase::NotStarted).unwrap();
        assert_eq!(json, "\"NOT_STARTED\"");
    }
}
