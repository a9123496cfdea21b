//! Robot phase machine
//!
//! Phases: IDLE → AT_NODE → TRAVERSING_EDGE → AT_NODE → … → IDLE.
//! PAUSED and ERROR are overlays reported on top of the phase.

use std::fmt;

use vda_protocol::ExecutionState;

/// Where the robot is in executing its order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    /// No order work pending, stationary
    #[default]
    Idle,
    /// Stationary at a node of the active order
    AtNode,
    /// Driving along an edge
    Traversing,
}

impl Phase {
    /// Check if transition from this phase to target is valid
    pub fn can_transition_to(&self, target: Phase) -> bool {
        match (self, target) {
            // Order accepted, or horizon extended after completion
            (Phase::Idle, Phase::AtNode) => true,

            (Phase::AtNode, Phase::Traversing) => true,
            (Phase::AtNode, Phase::Idle) => true,

            (Phase::Traversing, Phase::AtNode) => true,
            // cancelOrder mid-edge
            (Phase::Traversing, Phase::Idle) => true,

            // Replaced by a new order at the current node
            (Phase::AtNode, Phase::AtNode) => true,

            _ => false,
        }
    }

    pub fn is_stationary(&self) -> bool {
        !matches!(self, Phase::Traversing)
    }

    /// Reported execution state: ERROR wins over PAUSED, which wins over the
    /// phase itself.
    pub fn execution_state(&self, paused: bool, fatal: bool) -> ExecutionState {
        if fatal {
            ExecutionState::Error
        } else if paused {
            ExecutionState::Paused
        } else {
            match self {
                Phase::Idle => ExecutionState::Idle,
                Phase::AtNode => ExecutionState::AtNode,
                Phase::Traversing => ExecutionState::TraversingEdge,
            }
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "IDLE",
            Phase::AtNode => "AT_NODE",
            Phase::Traversing => "TRAVERSING_EDGE",
        };
        f.write_str(s)
    }
}
