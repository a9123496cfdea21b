//! The order graph held in a robot's active order slot

use vda_protocol::{Action, Edge, Node, Order};

use crate::action::ActionOrigin;

/// Accepted order: nodes and edges sorted by sequence id
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveOrder {
    pub order_id: String,
    pub order_update_id: u32,
    pub zone_set_id: Option<String>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl ActiveOrder {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.order_id.clone(),
            order_update_id: order.order_update_id,
            zone_set_id: order.zone_set_id.clone(),
            nodes: order.nodes.clone(),
            edges: order.edges.clone(),
        }
    }

    /// Merge an update into this order at `commit`.
    ///
    /// Nodes and edges up to the commit point come from this order; the
    /// rest come from the update.
    pub fn stitch(&self, update: &Order, commit: u32) -> Self {
        let nodes = self
            .nodes
            .iter()
            .filter(|n| n.sequence_id <= commit)
            .chain(update.nodes.iter().filter(|n| n.sequence_id > commit))
            .cloned()
            .collect();
        let edges = self
            .edges
            .iter()
            .filter(|e| e.sequence_id < commit)
            .chain(update.edges.iter().filter(|e| e.sequence_id > commit))
            .cloned()
            .collect();

        Self {
            order_id: update.order_id.clone(),
            order_update_id: update.order_update_id,
            zone_set_id: update.zone_set_id.clone(),
            nodes,
            edges,
        }
    }

    pub fn node(&self, sequence_id: u32) -> Option<&Node> {
        self.nodes.iter().find(|n| n.sequence_id == sequence_id)
    }

    pub fn edge(&self, sequence_id: u32) -> Option<&Edge> {
        self.edges.iter().find(|e| e.sequence_id == sequence_id)
    }

    pub fn first_node(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub fn final_node(&self) -> Option<&Node> {
        self.nodes.last()
    }

    /// Sequence id of the last released node
    pub fn last_released_node(&self) -> Option<u32> {
        self.nodes
            .iter()
            .take_while(|n| n.released)
            .last()
            .map(|n| n.sequence_id)
    }

    /// Some node or edge is not yet released
    pub fn has_horizon(&self) -> bool {
        self.nodes.iter().any(|n| !n.released) || self.edges.iter().any(|e| !e.released)
    }

    /// Every action with the node or edge it is attached to
    pub fn actions(&self) -> impl Iterator<Item = (ActionOrigin, &Action)> {
        let node_actions = self.nodes.iter().flat_map(|n| {
            n.actions
                .iter()
                .map(move |a| (ActionOrigin::Node(n.sequence_id), a))
        });
        let edge_actions = self.edges.iter().flat_map(|e| {
            e.actions
                .iter()
                .map(move |a| (ActionOrigin::Edge(e.sequence_id), a))
        });
        node_actions.chain(edge_actions)
    }

    /// Ids of every action in the graph
    pub fn action_ids(&self) -> Vec<String> {
        self.actions().map(|(_, a)| a.action_id.clone()).collect()
    }

    /// Nodes not yet reached, given the last reached node
    pub fn remaining_nodes(&self, last_sequence_id: u32) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(move |n| n.sequence_id > last_sequence_id)
    }

    /// Edges not yet completed, given the last reached node
    pub fn remaining_edges(&self, last_sequence_id: u32) -> impl Iterator<Item = &Edge> {
        self.edges
            .iter()
            .filter(move |e| e.sequence_id > last_sequence_id)
    }
}
