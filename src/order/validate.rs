//! Order validation
//!
//! Classifies an inbound order against the robot's current situation as a
//! new order, an update to the active order, a duplicate, or a rejection.
//! Validation is pure: it never touches robot state.

use std::collections::HashSet;

use vda_protocol::{Edge, Node, Order};

use super::graph::ActiveOrder;
use crate::action::ActionKind;
use crate::motion::allowed_deviation;

/// Position tolerance for comparing base nodes against history
const POSITION_EPSILON: f64 = 1e-6;

/// Why an order was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RejectReason {
    #[error("order while moving / node mismatch: {0}")]
    NodeMismatch(String),

    #[error("stale update: orderUpdateId {received} is lower than {current}")]
    StaleUpdate { received: u32, current: u32 },

    #[error("base mismatch: {0}")]
    BaseMismatch(String),

    #[error("malformed order: {0}")]
    Malformed(String),
}

/// How an accepted update is merged into the active order
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    /// Last sequence id kept from history
    pub commit_sequence_id: u32,
    /// Resulting graph
    pub merged: ActiveOrder,
    /// Horizon action ids of the old graph that the update dropped
    pub removed_action_ids: Vec<String>,
}

/// Validation outcome
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    AcceptNew(ActiveOrder),
    AcceptUpdate(MergePlan),
    /// Same orderId and orderUpdateId as the active order
    Duplicate,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::AcceptNew(_) | Verdict::AcceptUpdate(_))
    }

    /// Short label for logs and the CLI
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::AcceptNew(_) => "ACCEPT_NEW",
            Verdict::AcceptUpdate(_) => "ACCEPT_UPDATE",
            Verdict::Duplicate => "DUPLICATE",
            Verdict::Reject(_) => "REJECT",
        }
    }
}

/// What the validator needs to know about the robot
#[derive(Debug, Clone, Copy)]
pub struct RobotContext<'a> {
    /// Order in the active slot (kept after completion, emptied on cancel)
    pub active: Option<&'a ActiveOrder>,
    /// Id and update id of the most recently accepted order
    pub last_order: Option<(&'a str, u32)>,
    pub last_node_sequence_id: u32,
    /// Driving along an edge toward `last_node_sequence_id + 2`
    pub traversing: bool,
    pub x: f64,
    pub y: f64,
    pub default_deviation: f64,
}

impl RobotContext<'_> {
    /// Last sequence id that can no longer change. The edge in progress and
    /// its target node are committed while traversing.
    pub fn commit_point(&self) -> u32 {
        if self.traversing {
            self.last_node_sequence_id.saturating_add(2)
        } else {
            self.last_node_sequence_id
        }
    }
}

/// Classify `order` against the robot's situation.
pub fn validate(order: &Order, ctx: &RobotContext<'_>) -> Verdict {
    match classify(order, ctx) {
        Ok(verdict) => verdict,
        Err(reason) => Verdict::Reject(reason),
    }
}

fn classify(order: &Order, ctx: &RobotContext<'_>) -> Result<Verdict, RejectReason> {
    if let Some(active) = ctx.active.filter(|a| a.order_id == order.order_id) {
        if order.order_update_id < active.order_update_id {
            return Err(RejectReason::StaleUpdate {
                received: order.order_update_id,
                current: active.order_update_id,
            });
        }
        if order.order_update_id == active.order_update_id {
            return Ok(Verdict::Duplicate);
        }
        check_structure(order)?;
        return merge_update(order, active, ctx.commit_point()).map(Verdict::AcceptUpdate);
    }

    if let Some((last_id, last_update)) = ctx.last_order {
        if last_id == order.order_id {
            if order.order_update_id < last_update {
                return Err(RejectReason::StaleUpdate {
                    received: order.order_update_id,
                    current: last_update,
                });
            }
            if order.order_update_id == last_update {
                return Ok(Verdict::Duplicate);
            }
        }
    }

    let first = order
        .nodes
        .first()
        .ok_or_else(|| RejectReason::Malformed("order has no nodes".to_string()))?;
    let position = first.node_position.as_ref().ok_or_else(|| {
        RejectReason::Malformed(format!("node '{}' has no nodePosition", first.node_id))
    })?;

    if ctx.traversing {
        return Err(RejectReason::NodeMismatch(
            "robot is traversing an edge".to_string(),
        ));
    }
    let tolerance = allowed_deviation(position, ctx.default_deviation);
    let distance = (position.x - ctx.x).hypot(position.y - ctx.y);
    if distance > tolerance {
        return Err(RejectReason::NodeMismatch(format!(
            "first node '{}' is {:.3} m from the robot (allowed {:.3})",
            first.node_id, distance, tolerance
        )));
    }

    check_structure(order)?;
    Ok(Verdict::AcceptNew(ActiveOrder::from_order(order)))
}

/// Sequence, topology and content checks shared by new orders and updates.
pub fn check_structure(order: &Order) -> Result<(), RejectReason> {
    check_sequence(order)?;
    check_released_prefix(&order.nodes, &order.edges)?;
    check_content(order)?;
    check_unique_action_ids(&ActiveOrder::from_order(order))
}

fn malformed(msg: String) -> RejectReason {
    RejectReason::Malformed(msg)
}

fn check_sequence(order: &Order) -> Result<(), RejectReason> {
    let nodes = &order.nodes;
    if nodes.is_empty() {
        return Err(malformed("order has no nodes".to_string()));
    }
    if order.edges.len() + 1 != nodes.len() {
        return Err(malformed(format!(
            "{} nodes need {} edges, got {}",
            nodes.len(),
            nodes.len() - 1,
            order.edges.len()
        )));
    }

    for node in nodes {
        if node.sequence_id % 2 != 0 {
            return Err(malformed(format!(
                "node '{}' has odd sequenceId {}",
                node.node_id, node.sequence_id
            )));
        }
    }
    for pair in nodes.windows(2) {
        if pair[0].sequence_id.checked_add(2) != Some(pair[1].sequence_id) {
            return Err(malformed(format!(
                "node sequenceIds must step by 2 ({} -> {})",
                pair[0].sequence_id, pair[1].sequence_id
            )));
        }
    }

    for (k, edge) in order.edges.iter().enumerate() {
        let (start, end) = (&nodes[k], &nodes[k + 1]);
        let expected = start.sequence_id.checked_add(1).ok_or_else(|| {
            malformed(format!(
                "edge '{}' follows node '{}' at the last sequenceId",
                edge.edge_id, start.node_id
            ))
        })?;
        if edge.sequence_id != expected {
            return Err(malformed(format!(
                "edge '{}' has sequenceId {}, expected {}",
                edge.edge_id, edge.sequence_id, expected
            )));
        }
        if edge.start_node_id != start.node_id || edge.end_node_id != end.node_id {
            return Err(malformed(format!(
                "edge '{}' connects '{}' -> '{}', expected '{}' -> '{}'",
                edge.edge_id, edge.start_node_id, edge.end_node_id, start.node_id, end.node_id
            )));
        }
    }

    Ok(())
}

/// Released elements must form a prefix of the interleaved node/edge list.
fn check_released_prefix(nodes: &[Node], edges: &[Edge]) -> Result<(), RejectReason> {
    let mut released = nodes.iter().map(|n| (n.sequence_id, n.released)).collect::<Vec<_>>();
    released.extend(edges.iter().map(|e| (e.sequence_id, e.released)));
    released.sort_by_key(|(seq, _)| *seq);

    if let Some((_, false)) = released.first() {
        return Err(malformed("first node must be released".to_string()));
    }
    let mut horizon = false;
    for (seq, is_released) in released {
        if !is_released {
            horizon = true;
        } else if horizon {
            return Err(malformed(format!(
                "released element {} follows an unreleased one",
                seq
            )));
        }
    }
    Ok(())
}

fn check_content(order: &Order) -> Result<(), RejectReason> {
    for node in &order.nodes {
        if node.node_position.is_none() {
            return Err(malformed(format!(
                "node '{}' has no nodePosition",
                node.node_id
            )));
        }
    }
    for edge in &order.edges {
        if let Some(speed) = edge.max_speed {
            if !(speed > 0.0) {
                return Err(malformed(format!(
                    "edge '{}' has maxSpeed {}",
                    edge.edge_id, speed
                )));
            }
        }
    }

    let actions = order
        .nodes
        .iter()
        .flat_map(|n| n.actions.iter())
        .chain(order.edges.iter().flat_map(|e| e.actions.iter()));
    for action in actions {
        match ActionKind::parse(&action.action_type) {
            Some(kind) if kind.allowed_in_order() => {}
            Some(kind) => {
                return Err(malformed(format!(
                    "action '{}' of type {} is instant-only",
                    action.action_id, kind
                )))
            }
            None => {
                return Err(malformed(format!(
                    "action '{}' has unknown actionType '{}'",
                    action.action_id, action.action_type
                )))
            }
        }
    }
    Ok(())
}

fn check_unique_action_ids(order: &ActiveOrder) -> Result<(), RejectReason> {
    let mut seen = HashSet::new();
    for (_, action) in order.actions() {
        if !seen.insert(action.action_id.as_str()) {
            return Err(malformed(format!(
                "duplicate actionId '{}'",
                action.action_id
            )));
        }
    }
    Ok(())
}

fn same_position(a: &Node, b: &Node) -> bool {
    match (&a.node_position, &b.node_position) {
        (Some(p), Some(q)) => {
            (p.x - q.x).abs() <= POSITION_EPSILON && (p.y - q.y).abs() <= POSITION_EPSILON
        }
        (None, None) => true,
        _ => false,
    }
}

fn merge_update(order: &Order, active: &ActiveOrder, commit: u32) -> Result<MergePlan, RejectReason> {
    let first = &order.nodes[0];
    if first.sequence_id > commit {
        return Err(RejectReason::BaseMismatch(format!(
            "update starts at sequenceId {} after the committed node {}",
            first.sequence_id, commit
        )));
    }
    let last = &order.nodes[order.nodes.len() - 1];
    if last.sequence_id < commit {
        return Err(RejectReason::BaseMismatch(format!(
            "update ends at sequenceId {} before the committed node {}",
            last.sequence_id, commit
        )));
    }

    for node in order.nodes.iter().filter(|n| n.sequence_id <= commit) {
        let matches = active
            .node(node.sequence_id)
            .map(|h| h.node_id == node.node_id && same_position(h, node))
            .unwrap_or(false);
        if !matches {
            return Err(RejectReason::BaseMismatch(format!(
                "node '{}' at sequenceId {} differs from history",
                node.node_id, node.sequence_id
            )));
        }
    }
    for edge in order.edges.iter().filter(|e| e.sequence_id < commit) {
        let matches = active
            .edge(edge.sequence_id)
            .map(|h| h.edge_id == edge.edge_id)
            .unwrap_or(false);
        if !matches {
            return Err(RejectReason::BaseMismatch(format!(
                "edge '{}' at sequenceId {} differs from history",
                edge.edge_id, edge.sequence_id
            )));
        }
    }

    let merged = active.stitch(order, commit);
    check_unique_action_ids(&merged)?;
    check_released_prefix(&merged.nodes, &merged.edges)?;

    let kept: HashSet<String> = merged.action_ids().into_iter().collect();
    let removed_action_ids = active
        .action_ids()
        .into_iter()
        .filter(|id| !kept.contains(id))
        .collect();

    Ok(MergePlan {
        commit_sequence_id: commit,
        merged,
        removed_action_ids,
    })
}
