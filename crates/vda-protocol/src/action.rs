//! Action types shared by orders and instant actions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::header::Header;

/// How an action interacts with driving and other actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockingType {
    /// Runs fully concurrently with driving and other actions.
    None,
    /// Blocks node advancement; other SOFT/NONE actions may run alongside.
    Soft,
    /// Blocks driving and every other action while active.
    Hard,
}

impl fmt::Display for BlockingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Soft => write!(f, "SOFT"),
            Self::Hard => write!(f, "HARD"),
        }
    }
}

/// Lifecycle status of a single action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    /// Received, not started.
    Waiting,
    /// Preparing to run.
    Initializing,
    /// In progress.
    Running,
    /// Completed successfully.
    Finished,
    /// Aborted, rejected or faulted.
    Failed,
}

impl ActionStatus {
    /// Returns true once the action can no longer change status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionStatus::Finished | ActionStatus::Failed)
    }

    /// Returns true while the action occupies the robot.
    pub fn is_active(&self) -> bool {
        matches!(self, ActionStatus::Initializing | ActionStatus::Running)
    }
}

/// Key/value parameter attached to an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionParameter {
    pub key: String,
    pub value: serde_json::Value,
}

/// An action attached to a node, an edge, or sent as an instant action.
///
/// `action_type` stays a plain string on the wire; it is mapped onto the
/// simulator's action enum during validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub action_type: String,
    pub action_id: String,
    pub blocking_type: BlockingType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_description: Option<String>,
    #[serde(default)]
    pub action_parameters: Vec<ActionParameter>,
}

impl Action {
    /// Create an action without parameters.
    pub fn new(
        action_type: impl Into<String>,
        action_id: impl Into<String>,
        blocking_type: BlockingType,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            action_id: action_id.into(),
            blocking_type,
            action_description: None,
            action_parameters: Vec::new(),
        }
    }

    /// Add a parameter (builder style).
    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.action_parameters.push(ActionParameter {
            key: key.into(),
            value,
        });
        self
    }

    /// Look up a parameter value by key.
    pub fn parameter(&self, key: &str) -> Option<&serde_json::Value> {
        self.action_parameters
            .iter()
            .find(|p| p.key == key)
            .map(|p| &p.value)
    }
}

/// Instant actions message: actions to run immediately, outside the order graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstantActions {
    #[serde(flatten)]
    pub header: Header,
    /// VDA5050 1.x called this list `instantActions`.
    #[serde(alias = "instantActions")]
    pub actions: Vec<Action>,
}
