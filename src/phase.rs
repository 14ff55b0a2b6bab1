//! Task lifecycle phases.
//!
//! This module provides:
//! - `Phase`, the tagged lifecycle step a task is in
//! - the legal-edge table consulted by the state machine
//! - the canonical happy-path ordering used for reporting and tests

use serde::{Deserialize, Serialize};
use std::fmt;

/// A task's current step in its fixed lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// A backlog item has been picked but no spec exists yet
    Discovery,
    /// The specifier is producing a spec with acceptance criteria
    Specify,
    /// A failing test is being written for the current criterion
    Red,
    /// The implementation is being written to make the test pass
    Green,
    /// Build, lint and the full test suite are being run
    Validate,
    /// Behavior-preserving cleanup of the new code
    Refactor,
    /// Terminal: all criteria covered and committed
    Complete,
    /// Terminal: the task could not proceed
    Blocked,
}

/// The lifecycle in happy-path order, excluding `Blocked`.
pub const LIFECYCLE: [Phase; 7] = [
    Phase::Discovery,
    Phase::Specify,
    Phase::Red,
    Phase::Green,
    Phase::Validate,
    Phase::Refactor,
    Phase::Complete,
];

impl Phase {
    /// All phases, in declaration order.
    pub fn all() -> [Phase; 8] {
        [
            Phase::Discovery,
            Phase::Specify,
            Phase::Red,
            Phase::Green,
            Phase::Validate,
            Phase::Refactor,
            Phase::Complete,
            Phase::Blocked,
        ]
    }

    /// Terminal phases release the task slot.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Blocked)
    }

    /// Check whether `self -> next` is a legal edge.
    ///
    /// Self-loops are legal for every non-terminal phase (retries), and every
    /// non-terminal phase may escalate to `Blocked`. Green is only reachable
    /// from Red, or from Validate when validation sends the task back.
    pub fn can_transition_to(&self, next: Phase) -> bool {
        if self.is_terminal() {
            return false;
        }
        if *self == next || next == Phase::Blocked {
            return true;
        }
        matches!(
            (self, next),
            (Phase::Discovery, Phase::Specify)
                | (Phase::Specify, Phase::Red)
                | (Phase::Red, Phase::Green)
                | (Phase::Green, Phase::Validate)
                | (Phase::Validate, Phase::Refactor)
                | (Phase::Validate, Phase::Green)
                | (Phase::Refactor, Phase::Red)
                | (Phase::Refactor, Phase::Complete)
        )
    }

    /// Position in the happy path, `None` for `Blocked`.
    pub fn ordinal(&self) -> Option<usize> {
        LIFECYCLE.iter().position(|p| p == self)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Discovery => "discovery",
            Phase::Specify => "specify",
            Phase::Red => "red",
            Phase::Green => "green",
            Phase::Validate => "validate",
            Phase::Refactor => "refactor",
            Phase::Complete => "complete",
            Phase::Blocked => "blocked",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::all()
            .into_iter()
            .find(|p| p.to_string() == s.to_lowercase())
            .ok_or_else(|| anyhow::anyhow!("Unknown phase '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_edges_are_legal() {
        for pair in LIFECYCLE.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_green_only_reachable_from_red_or_validate() {
        for phase in Phase::all() {
            let legal = phase.can_transition_to(Phase::Green);
            let expected = matches!(phase, Phase::Red | Phase::Green | Phase::Validate);
            assert_eq!(legal, expected, "{} -> green", phase);
        }
    }

    #[test]
    fn test_no_backwards_edge_to_specify() {
        assert!(!Phase::Green.can_transition_to(Phase::Specify));
        assert!(!Phase::Refactor.can_transition_to(Phase::Specify));
        assert!(!Phase::Red.can_transition_to(Phase::Discovery));
    }

    #[test]
    fn test_no_phase_skipping() {
        assert!(!Phase::Specify.can_transition_to(Phase::Green));
        assert!(!Phase::Red.can_transition_to(Phase::Validate));
        assert!(!Phase::Green.can_transition_to(Phase::Refactor));
        assert!(!Phase::Validate.can_transition_to(Phase::Complete));
    }

    #[test]
    fn test_terminal_phases_have_no_exits() {
        for next in Phase::all() {
            assert!(!Phase::Complete.can_transition_to(next));
            assert!(!Phase::Blocked.can_transition_to(next));
        }
    }

    #[test]
    fn test_every_active_phase_can_block() {
        for phase in Phase::all().into_iter().filter(|p| !p.is_terminal()) {
            assert!(phase.can_transition_to(Phase::Blocked));
        }
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&Phase::Refactor).unwrap();
        assert_eq!(json, "\"refactor\"");
        let parsed: Phase = serde_json::from_str("\"validate\"").unwrap();
        assert_eq!(parsed, Phase::Validate);
    }

    #[test]
    fn test_phase_from_str() {
        assert_eq!("RED".parse::<Phase>().unwrap(), Phase::Red);
        assert!("yellow".parse::<Phase>().is_err());
    }

    #[test]
    fn test_ordinal() {
        assert_eq!(Phase::Discovery.ordinal(), Some(0));
        assert_eq!(Phase::Complete.ordinal(), Some(6));
        assert_eq!(Phase::Blocked.ordinal(), None);
    }
}
