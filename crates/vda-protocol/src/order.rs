//! Order message: a graph of nodes and edges the AGV must traverse.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::header::Header;

/// Position of a node in the map frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
    /// Target orientation on arrival (radians). Free when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theta: Option<f64>,
    /// Allowed positional deviation (meters) for the node to count as reached.
    #[serde(
        default,
        rename = "allowedDeviationXY",
        skip_serializing_if = "Option::is_none"
    )]
    pub allowed_deviation_xy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_deviation_theta: Option<f64>,
    #[serde(default)]
    pub map_id: String,
}

impl NodePosition {
    /// Create a position on the default map.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            theta: None,
            allowed_deviation_xy: None,
            allowed_deviation_theta: None,
            map_id: String::new(),
        }
    }
}

/// A node of the order graph. Node sequence ids are even.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub node_id: String,
    pub sequence_id: u32,
    #[serde(default = "default_released")]
    pub released: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_position: Option<NodePosition>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// An edge connecting two consecutive nodes. Edge sequence ids are odd.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub edge_id: String,
    pub sequence_id: u32,
    #[serde(default = "default_released")]
    pub released: bool,
    pub start_node_id: String,
    pub end_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_description: Option<String>,
    /// Maximum permitted speed on this edge (m/s).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_speed: Option<f64>,
    /// Informational edge length (meters).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// Order message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(flatten)]
    pub header: Header,
    pub order_id: String,
    pub order_update_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_set_id: Option<String>,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

fn default_released() -> bool {
    true
}
