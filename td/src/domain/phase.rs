//! Run phase state machine.
//!
//! Mirrors the monotone-transition discipline `LoopExecutionStatus` already
//! enforces for loop executions, applied to the run-level phase sequence.

use serde::{Deserialize, Serialize};

/// A run's current activity, in the order a run is expected to pass
/// through it. Retrying the same phase is allowed; moving backward is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Scoping,
    PlanningLite,
    Executing,
    Converging,
    Verifying,
    Reporting,
    Completed,
    Failed,
}

impl RunPhase {
    /// Every phase ordered before `Completed`/`Failed` in the nominal
    /// sequence, used to validate transitions.
    const ORDER: [RunPhase; 8] = [
        RunPhase::Scoping,
        RunPhase::PlanningLite,
        RunPhase::Executing,
        RunPhase::Converging,
        RunPhase::Verifying,
        RunPhase::Reporting,
        RunPhase::Completed,
        RunPhase::Failed,
    ];

    fn rank(self) -> usize {
        Self::ORDER.iter().position(|p| *p == self).unwrap()
    }

    /// True if moving from `self` to `next` is allowed: staying put, or
    /// advancing, or jumping straight to `Failed` from anywhere non-terminal.
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == RunPhase::Failed {
            return true;
        }
        next.rank() >= self.rank()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed)
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunPhase::Scoping => "scoping",
            RunPhase::PlanningLite => "planning_lite",
            RunPhase::Executing => "executing",
            RunPhase::Converging => "converging",
            RunPhase::Verifying => "verifying",
            RunPhase::Reporting => "reporting",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_allowed() {
        assert!(RunPhase::Scoping.can_transition_to(RunPhase::Executing));
        assert!(RunPhase::Executing.can_transition_to(RunPhase::Converging));
    }

    #[test]
    fn retrying_the_same_phase_is_allowed() {
        assert!(RunPhase::Executing.can_transition_to(RunPhase::Executing));
    }

    #[test]
    fn backward_transitions_are_rejected() {
        assert!(!RunPhase::Converging.can_transition_to(RunPhase::Executing));
        assert!(!RunPhase::Reporting.can_transition_to(RunPhase::Scoping));
    }

    #[test]
    fn failed_is_reachable_from_any_non_terminal_phase() {
        assert!(RunPhase::Scoping.can_transition_to(RunPhase::Failed));
        assert!(RunPhase::Verifying.can_transition_to(RunPhase::Failed));
    }

    #[test]
    fn terminal_phases_accept_no_further_transitions() {
        assert!(!RunPhase::Completed.can_transition_to(RunPhase::Completed));
        assert!(!RunPhase::Failed.can_transition_to(RunPhase::Reporting));
    }

    #[test]
    fn display_matches_spec_vocabulary() {
        assert_eq!(RunPhase::PlanningLite.to_string(), "planning_lite");
    }
}
