//! State and visualization messages published by the AGV.

use serde::{Deserialize, Serialize};

use crate::action::ActionStatus;
use crate::error::ErrorLevel;
use crate::header::Header;
use crate::order::NodePosition;

/// Operating mode of the AGV.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingMode {
    #[default]
    Automatic,
    Semiautomatic,
    Manual,
    Service,
    Teachin,
}

/// Coarse execution state of the simulated robot (simulator extension).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    /// No order work pending, stationary.
    Idle,
    /// Stationary at a node of the active order.
    AtNode,
    /// Moving along an edge.
    TraversingEdge,
    /// Externally paused.
    Paused,
    /// A FATAL error is active.
    Error,
}

/// Position of the AGV in the map frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgvPosition {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    #[serde(default)]
    pub map_id: String,
    #[serde(default)]
    pub position_initialized: bool,
}

/// Velocity in the vehicle frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

/// Not-yet-traversed node of the active order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    pub node_id: String,
    pub sequence_id: u32,
    pub released: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_position: Option<NodePosition>,
}

/// Not-yet-traversed edge of the active order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeState {
    pub edge_id: String,
    pub sequence_id: u32,
    pub released: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_description: Option<String>,
}

/// Status of one order or instant action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionState {
    pub action_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_description: Option<String>,
    pub action_status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_description: Option<String>,
}

/// Battery status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryState {
    /// State of charge in percent, [0, 100].
    pub battery_charge: f64,
    pub charging: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reach: Option<u32>,
}

/// A load carried by the AGV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Load {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_type: Option<String>,
}

/// Key/value pointer from an error to the entity that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReference {
    pub reference_key: String,
    pub reference_value: String,
}

/// An active error record.
///
/// `error_type` is a string so consumers tolerate categories they do not
/// know; the simulator emits the values of [`crate::ErrorKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgvError {
    pub error_type: String,
    pub error_level: ErrorLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_references: Vec<ErrorReference>,
}

/// Free-form informational message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Information {
    pub info_type: String,
    pub info_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_description: Option<String>,
}

/// Safety status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyState {
    pub e_stop: String,
    pub field_violation: bool,
}

/// Full state snapshot, published every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    #[serde(flatten)]
    pub header: Header,
    pub order_id: String,
    pub order_update_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_set_id: Option<String>,
    pub last_node_id: String,
    pub last_node_sequence_id: u32,
    #[serde(default)]
    pub node_states: Vec<NodeState>,
    #[serde(default)]
    pub edge_states: Vec<EdgeState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agv_position: Option<AgvPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<Velocity>,
    #[serde(default)]
    pub loads: Vec<Load>,
    pub driving: bool,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub new_base_request: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_since_last_node: Option<f64>,
    #[serde(default)]
    pub action_states: Vec<ActionState>,
    pub battery_state: BatteryState,
    pub operating_mode: OperatingMode,
    #[serde(default)]
    pub errors: Vec<AgvError>,
    #[serde(default)]
    pub information: Vec<Information>,
    #[serde(default)]
    pub safety_state: SafetyState,
    pub execution_state: ExecutionState,
}

impl State {
    /// Returns true if any FATAL error is listed.
    pub fn has_fatal_error(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.error_level == ErrorLevel::Fatal)
    }

    /// Look up an action state by id.
    pub fn action_state(&self, action_id: &str) -> Option<&ActionState> {
        self.action_states.iter().find(|a| a.action_id == action_id)
    }
}

/// Lightweight snapshot for rendering consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visualization {
    #[serde(flatten)]
    pub header: Header,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agv_position: Option<AgvPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<Velocity>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_execution_state_wire_names() {
        assert_eq!(
            serde_json::to_value(ExecutionState::TraversingEdge).unwrap(),
            "TRAVERSING_EDGE"
        );
        assert_eq!(serde_json::to_value(ExecutionState::AtNode).unwrap(), "AT_NODE");
    }

    #[test]
    fn test_error_record_tolerates_unknown_type() {
        let error: AgvError = serde_json::from_value(json!({
            "errorType": "vendorSpecificError",
            "errorLevel": "WARNING"
        }))
        .unwrap();
        assert_eq!(error.error_type, "vendorSpecificError");
        assert!(error.error_references.is_empty());
    }

    #[test]
    fn test_safety_state_keys() {
        let safety = SafetyState {
            e_stop: "NONE".to_string(),
            field_violation: false,
        };
        let json = serde_json::to_value(safety).unwrap();
        assert_eq!(json["eStop"], "NONE");
        assert_eq!(json["fieldViolation"], false);
    }
}
