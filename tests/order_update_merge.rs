//! Order update and merge tests
//!
//! Updates stitch onto the committed base of the active order. Applying an
//! order and then its update must end in the same state as applying the
//! stitched graph directly.

mod fixtures;

use fixtures::*;
use vda_protocol::{ExecutionState, State};

const LINE: [(f64, f64); 4] = [(0.0, 0.0), (2.0, 0.0), (4.0, 0.0), (6.0, 0.0)];

/// Errors cleared and header normalized, for comparing twins.
fn comparable(mut state: State) -> State {
    state.errors.clear();
    without_header(state)
}

#[test]
fn test_update_in_same_tick_equals_direct_order() {
    let a = with_horizon(chain("o", 0, &LINE[..3], 1.0), 2);
    let b = chain("o", 1, &LINE, 1.0);

    let mut stitched = robot_at(0.0, 0.0);
    let mut direct = robot_at(0.0, 0.0);

    let first = tick(&mut stitched, vec![order_input(a), order_input(b.clone())]).state;
    assert!(first.errors.is_empty(), "{:?}", first.errors);
    assert_eq!(first.order_update_id, 1);
    tick(&mut direct, vec![order_input(b)]);

    let x = run_ticks(&mut stitched, 80).pop().unwrap();
    let y = run_ticks(&mut direct, 80).pop().unwrap();

    assert_eq!(x.execution_state, ExecutionState::Idle);
    assert_eq!(x.last_node_id, "N4");
    assert_eq!(without_header(x), without_header(y));
}

#[test]
fn test_update_while_traversing_equals_direct_order() {
    let a = with_horizon(chain("o", 0, &LINE[..3], 1.0), 2);
    let b = chain_from("o", 1, 2, &LINE[1..], 1.0);
    let direct_order = chain("o", 1, &LINE, 1.0);

    let mut stitched = robot_at(0.0, 0.0);
    let mut direct = robot_at(0.0, 0.0);
    tick(&mut stitched, vec![order_input(a)]);
    tick(&mut direct, vec![order_input(direct_order)]);
    run_ticks(&mut stitched, 4);
    run_ticks(&mut direct, 4);

    let merged = tick(&mut stitched, vec![order_input(b)]).state;
    assert!(merged.errors.is_empty(), "{:?}", merged.errors);
    assert_eq!(merged.execution_state, ExecutionState::TraversingEdge);
    let seqs: Vec<u32> = merged.node_states.iter().map(|n| n.sequence_id).collect();
    assert_eq!(seqs, vec![2, 4, 6]);
    tick(&mut direct, Vec::new());

    let x = run_ticks(&mut stitched, 80).pop().unwrap();
    let y = run_ticks(&mut direct, 80).pop().unwrap();
    assert_eq!(x.last_node_sequence_id, 6);
    assert_eq!(without_header(x), without_header(y));
}

#[test]
fn test_robot_waits_at_last_released_node_and_requests_base() {
    let a = with_horizon(chain("o", 0, &LINE[..3], 1.0), 2);
    let mut robot = robot_at(0.0, 0.0);

    let first = tick(&mut robot, vec![order_input(a)]).state;
    assert!(first.new_base_request, "committed node is the last released one");
    assert!(first.node_states.iter().any(|n| !n.released));

    let waiting = run_ticks(&mut robot, 40).pop().unwrap();
    assert_eq!(waiting.last_node_id, "N2");
    assert_eq!(waiting.execution_state, ExecutionState::AtNode);
    assert!(!waiting.driving);
    assert!(waiting.new_base_request);

    let extended = chain_from("o", 1, 2, &LINE[1..3], 1.0);
    let resumed = tick(&mut robot, vec![order_input(extended)]).state;
    assert!(resumed.errors.is_empty(), "{:?}", resumed.errors);
    assert!(!resumed.new_base_request);
    assert_eq!(resumed.execution_state, ExecutionState::TraversingEdge);

    let done = run_until(&mut robot, 40, |s| s.execution_state == ExecutionState::Idle).unwrap();
    assert_eq!(done.last_node_id, "N3");
}

#[test]
fn test_update_extends_finished_order() {
    let mut robot = robot_at(0.0, 0.0);
    tick(&mut robot, vec![order_input(chain("o", 0, &LINE[..2], 1.0))]);
    let idle = run_until(&mut robot, 40, |s| s.execution_state == ExecutionState::Idle).unwrap();
    assert_eq!(idle.last_node_id, "N2");

    let extension = chain_from("o", 1, 2, &LINE[1..3], 1.0);
    let state = tick(&mut robot, vec![order_input(extension)]).state;
    assert!(state.errors.is_empty(), "{:?}", state.errors);
    assert_eq!(state.execution_state, ExecutionState::TraversingEdge);
}

#[test]
fn test_update_drops_replaced_horizon_actions() {
    let mut a = with_horizon(chain("o", 0, &LINE[..3], 1.0), 2);
    a.nodes[2].actions.push(hard("pick", "pick-n3"));
    let b = chain_from("o", 1, 2, &LINE[1..3], 1.0);

    let mut robot = robot_at(0.0, 0.0);
    let first = tick(&mut robot, vec![order_input(a)]).state;
    assert!(first.action_state("pick-n3").is_some());

    let merged = tick(&mut robot, vec![order_input(b)]).state;
    assert!(merged.errors.is_empty(), "{:?}", merged.errors);
    assert!(merged.action_state("pick-n3").is_none());
}

#[test]
fn test_stale_update_rejected_and_state_unchanged() {
    let a = with_horizon(chain("o", 0, &LINE[..3], 1.0), 2);
    let b = chain("o", 1, &LINE[..3], 1.0);

    let mut rejected = robot_at(0.0, 0.0);
    let mut reference = robot_at(0.0, 0.0);
    for robot in [&mut rejected, &mut reference] {
        tick(robot, vec![order_input(a.clone()), order_input(b.clone())]);
        run_ticks(robot, 5);
    }

    let x = tick(&mut rejected, vec![order_input(a)]).state;
    let y = tick(&mut reference, Vec::new()).state;

    let description = x.errors[0].error_description.clone().unwrap();
    assert!(description.starts_with("stale update"), "{}", description);
    assert_eq!(x.errors[0].error_type, "VALIDATION_ERROR");
    assert_eq!(x.order_update_id, 1);
    assert_eq!(comparable(x), comparable(y));
}

#[test]
fn test_base_mismatch_rejected_and_state_unchanged() {
    let a = with_horizon(chain("o", 0, &LINE[..3], 1.0), 2);
    let mut moved = chain_from("o", 1, 2, &LINE[1..], 1.0);
    moved.nodes[0].node_position.as_mut().unwrap().x = 2.5;

    let mut rejected = robot_at(0.0, 0.0);
    let mut reference = robot_at(0.0, 0.0);
    for robot in [&mut rejected, &mut reference] {
        tick(robot, vec![order_input(a.clone())]);
        run_ticks(robot, 3);
    }

    let x = tick(&mut rejected, vec![order_input(moved)]).state;
    let y = tick(&mut reference, Vec::new()).state;

    let description = x.errors[0].error_description.clone().unwrap();
    assert!(description.starts_with("base mismatch"), "{}", description);
    assert_eq!(x.order_update_id, 0);
    assert_eq!(comparable(x), comparable(y));
}

#[test]
fn test_update_starting_after_commit_point_rejected() {
    let a = with_horizon(chain("o", 0, &LINE[..3], 1.0), 2);
    // Robot is still on E1, so N2 is committed but N3 is not a valid start.
    let skip = chain_from("o", 1, 3, &LINE[2..], 1.0);

    let mut robot = robot_at(0.0, 0.0);
    tick(&mut robot, vec![order_input(a)]);
    let state = tick(&mut robot, vec![order_input(skip)]).state;

    assert_eq!(state.order_update_id, 0);
    assert!(state.errors[0]
        .error_description
        .as_deref()
        .unwrap()
        .starts_with("base mismatch"));
}

#[test]
fn test_duplicate_update_is_a_no_op() {
    let a = with_horizon(chain("o", 0, &LINE[..3], 1.0), 2);
    let b = chain_from("o", 1, 2, &LINE[1..], 1.0);

    let mut with_dup = robot_at(0.0, 0.0);
    let mut without_dup = robot_at(0.0, 0.0);
    for robot in [&mut with_dup, &mut without_dup] {
        tick(robot, vec![order_input(a.clone())]);
        tick(robot, vec![order_input(b.clone())]);
    }

    let x = tick(&mut with_dup, vec![order_input(b)]).state;
    let y = tick(&mut without_dup, Vec::new()).state;
    assert!(x.errors.is_empty());
    assert_eq!(without_header(x), without_header(y));
}

#[test]
fn test_cancelled_order_remembered_for_stale_and_duplicate() {
    let a = chain("o", 3, &LINE[..2], 1.0);
    let mut robot = robot_at(0.0, 0.0);
    tick(&mut robot, vec![order_input(a.clone())]);
    run_ticks(&mut robot, 3);
    let cancelled = tick(&mut robot, vec![instant(vec![instant_action("cancelOrder", "c1")])]).state;
    assert_eq!(cancelled.order_id, "");

    // Same update again: ignored
    let dup = tick(&mut robot, vec![order_input(a)]).state;
    assert!(dup.errors.is_empty());
    assert_eq!(dup.order_id, "");

    // Older update: stale
    let old = chain("o", 2, &LINE[..2], 1.0);
    let stale = tick(&mut robot, vec![order_input(old)]).state;
    assert!(stale.errors[0]
        .error_description
        .as_deref()
        .unwrap()
        .starts_with("stale update"));
}
