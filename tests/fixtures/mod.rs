//! Test fixtures: order builders and tick drivers
//!
//! Orders are built in code for most tests; the JSON files under
//! `tests/fixtures/orders/` cover the wire path.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::json;
use vda5050_sim::{RobotInput, RobotMachine, RobotSpec, SimConfig, TickOutput};
use vda_protocol::{
    Action, BlockingType, Channel, Edge, Header, InstantActions, Node, NodePosition, Order,
    State, PROTOCOL_VERSION,
};

/// Simulated time per tick in every test
pub const DT: Duration = Duration::from_millis(100);

/// Path to a JSON order fixture
pub fn order_fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/orders")
        .join(name)
}

/// Raw bytes of a JSON order fixture
pub fn order_fixture(name: &str) -> Vec<u8> {
    std::fs::read(order_fixture_path(name)).expect("fixture exists")
}

/// Deterministic config: no random errors or failures, fixed seed.
pub fn config() -> SimConfig {
    let mut config = SimConfig::default();
    config.errors.seed = Some(7);
    config
}

pub fn robot_at(x: f64, y: f64) -> RobotMachine {
    robot_with(&config(), x, y)
}

pub fn robot_with(config: &SimConfig, x: f64, y: f64) -> RobotMachine {
    RobotMachine::new(RobotSpec::at("robot_1", x, y, 0.0), config).expect("valid config")
}

pub fn header() -> Header {
    Header::new(1, PROTOCOL_VERSION, "Acme", "SN1001")
}

pub fn node(id: &str, sequence_id: u32, x: f64, y: f64) -> Node {
    Node {
        node_id: id.to_string(),
        sequence_id,
        released: true,
        node_description: None,
        node_position: Some(NodePosition::new(x, y)),
        actions: Vec::new(),
    }
}

pub fn edge(id: &str, sequence_id: u32, start: &str, end: &str, max_speed: f64) -> Edge {
    Edge {
        edge_id: id.to_string(),
        sequence_id,
        released: true,
        start_node_id: start.to_string(),
        end_node_id: end.to_string(),
        edge_description: None,
        max_speed: Some(max_speed),
        length: None,
        actions: Vec::new(),
    }
}

pub fn order(order_id: &str, update: u32, nodes: Vec<Node>, edges: Vec<Edge>) -> Order {
    Order {
        header: header(),
        order_id: order_id.to_string(),
        order_update_id: update,
        zone_set_id: None,
        nodes,
        edges,
    }
}

/// Straight chain through `points`: nodes N1.. at sequence 0, 2, .. and
/// edges E1.. between them, all released.
pub fn chain(order_id: &str, update: u32, points: &[(f64, f64)], max_speed: f64) -> Order {
    chain_from(order_id, update, 1, points, max_speed)
}

/// Chain whose first node is N`first` (sequence id `2 * (first - 1)`).
pub fn chain_from(
    order_id: &str,
    update: u32,
    first: u32,
    points: &[(f64, f64)],
    max_speed: f64,
) -> Order {
    let nodes: Vec<Node> = points
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| {
            let n = first + i as u32;
            node(&format!("N{}", n), 2 * (n - 1), x, y)
        })
        .collect();
    let edges = (1..points.len())
        .map(|i| {
            let n = first + i as u32 - 1;
            edge(
                &format!("E{}", n),
                2 * n - 1,
                &format!("N{}", n),
                &format!("N{}", n + 1),
                max_speed,
            )
        })
        .collect();
    order(order_id, update, nodes, edges)
}

/// Mark everything after the first `released_nodes` nodes as horizon.
pub fn with_horizon(mut order: Order, released_nodes: usize) -> Order {
    for (i, node) in order.nodes.iter_mut().enumerate() {
        node.released = i < released_nodes;
    }
    for (i, edge) in order.edges.iter_mut().enumerate() {
        edge.released = i + 1 < released_nodes;
    }
    order
}

pub fn hard(action_type: &str, id: &str) -> Action {
    Action::new(action_type, id, BlockingType::Hard)
}

pub fn wait_action(id: &str, seconds: f64, blocking: BlockingType) -> Action {
    Action::new("wait", id, blocking).with_parameter("duration", json!(seconds))
}

pub fn instant_action(action_type: &str, id: &str) -> Action {
    Action::new(action_type, id, BlockingType::None)
}

pub fn instant(actions: Vec<Action>) -> RobotInput {
    RobotInput::InstantActions(InstantActions {
        header: header(),
        actions,
    })
}

pub fn order_input(order: Order) -> RobotInput {
    RobotInput::Order(order)
}

/// Decode raw order bytes the way the robot inbox does.
pub fn wire_order(bytes: &[u8]) -> RobotInput {
    RobotInput::decode(Channel::Order, "uagv/robot_1/order", bytes)
}

pub fn tick(machine: &mut RobotMachine, inputs: Vec<RobotInput>) -> TickOutput {
    machine.tick(inputs, DT)
}

/// Tick with no inputs `n` times and return every state.
pub fn run_ticks(machine: &mut RobotMachine, n: usize) -> Vec<State> {
    (0..n).map(|_| tick(machine, Vec::new()).state).collect()
}

/// Tick with no inputs until `done` holds, at most `max_ticks` times.
pub fn run_until<F>(machine: &mut RobotMachine, max_ticks: usize, done: F) -> Option<State>
where
    F: Fn(&State) -> bool,
{
    for _ in 0..max_ticks {
        let state = tick(machine, Vec::new()).state;
        if done(&state) {
            return Some(state);
        }
    }
    None
}

/// State with the header replaced, for comparing two robots' snapshots.
pub fn without_header(mut state: State) -> State {
    use chrono::TimeZone;
    state.header.timestamp = chrono::Utc
        .timestamp_opt(0, 0)
        .single()
        .expect("epoch is valid");
    state
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}
