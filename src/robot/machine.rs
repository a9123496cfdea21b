//! Per-robot order execution state machine
//!
//! A [`RobotMachine`] owns one robot's mutable state and is its only writer.
//! Each [`tick`](RobotMachine::tick) applies the inputs drained from the
//! inbox, then steps actions, motion and health, and returns the state and
//! visualization snapshots for that tick.

use std::time::Duration;

use tracing::{debug, info, warn};
use vda_protocol::{
    ErrorKind, ErrorLevel, Load, OperatingMode, Order, State, Visualization,
};

use super::inbox::{partition, RobotInput};
use super::phase::Phase;
use super::snapshot::HeaderCounters;
use crate::action::{
    ActionContext, ActionEffect, ActionEvent, ActionExecutor, ActionOrigin, ActionTimings,
    ExecMode,
};
use crate::config::{ConfigError, MotionSettings, RobotSpec, SimConfig};
use crate::health::{error_record, BatteryActivity, HealthModel};
use crate::motion::{advance, effective_speed, MotionTarget, Pose};
use crate::order::{validate, ActiveOrder, MergePlan, RobotContext, Verdict};

/// Snapshots produced by one tick
#[derive(Debug, Clone)]
pub struct TickOutput {
    pub state: State,
    pub visualization: Visualization,
}

/// One simulated robot
#[derive(Debug)]
pub struct RobotMachine {
    pub(super) spec: RobotSpec,
    pub(super) manufacturer: String,
    pub(super) version: String,
    pub(super) operating_mode: OperatingMode,
    motion: MotionSettings,
    fatal_on_failure: bool,
    timings: ActionTimings,
    charging_stations: Vec<String>,
    charge_target: f64,

    pub(super) phase: Phase,
    pub(super) paused: bool,
    pub(super) pose: Pose,
    pub(super) map_id: String,
    pub(super) position_initialized: bool,
    pub(super) driving: bool,
    pub(super) speed: f64,

    pub(super) order: Option<ActiveOrder>,
    /// Id and update id of the last accepted order, kept after cancel
    last_order: Option<(String, u32)>,
    pub(super) last_node_id: String,
    pub(super) last_node_sequence_id: u32,
    pub(super) distance_since_last_node: f64,
    pub(super) new_base_request: bool,
    pub(super) loads: Vec<Load>,

    pub(super) executor: ActionExecutor,
    pub(super) health: HealthModel,
    pub(super) headers: HeaderCounters,
    sim_time: Duration,
}

impl RobotMachine {
    /// Robot described by `spec`, idle at its start pose.
    pub fn new(spec: RobotSpec, config: &SimConfig) -> Result<Self, ConfigError> {
        let timings = config.action_timings()?;
        let pose = Pose::new(spec.start.x, spec.start.y, spec.start.theta);

        Ok(Self {
            manufacturer: config.fleet.manufacturer.clone(),
            version: config.fleet.version.clone(),
            operating_mode: config.fleet.operating_mode,
            motion: config.motion.clone(),
            fatal_on_failure: config.actions.fatal_on_failure,
            timings,
            charging_stations: config.battery.charging_stations.clone(),
            charge_target: config.battery.charge_target,

            phase: Phase::Idle,
            paused: false,
            pose,
            map_id: spec.map_id.clone(),
            position_initialized: true,
            driving: false,
            speed: 0.0,

            order: None,
            last_order: None,
            last_node_id: String::new(),
            last_node_sequence_id: 0,
            distance_since_last_node: 0.0,
            new_base_request: false,
            loads: Vec::new(),

            executor: ActionExecutor::new(config.timeouts().action_budget()),
            health: HealthModel::new(config, spec.index),
            headers: HeaderCounters::default(),
            sim_time: Duration::ZERO,
            spec,
        })
    }

    pub fn robot_id(&self) -> &str {
        &self.spec.robot_id
    }

    pub fn spec(&self) -> &RobotSpec {
        &self.spec
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn active_order(&self) -> Option<&ActiveOrder> {
        self.order.as_ref()
    }

    /// Total simulated time
    pub fn sim_time(&self) -> Duration {
        self.sim_time
    }

    pub fn health_mut(&mut self) -> &mut HealthModel {
        &mut self.health
    }

    /// Validation context for the robot's current situation
    pub fn robot_context(&self) -> RobotContext<'_> {
        RobotContext {
            active: self.order.as_ref(),
            last_order: self
                .last_order
                .as_ref()
                .map(|(id, update)| (id.as_str(), *update)),
            last_node_sequence_id: self.last_node_sequence_id,
            traversing: self.phase == Phase::Traversing,
            x: self.pose.x,
            y: self.pose.y,
            default_deviation: self.motion.default_allowed_deviation,
        }
    }

    /// Run one tick advancing simulated time by `dt`.
    ///
    /// Instant actions, forced errors and undecodable payloads are applied
    /// first, then orders, each in arrival order.
    pub fn tick(&mut self, inputs: Vec<RobotInput>, dt: Duration) -> TickOutput {
        self.sim_time += dt;

        let (immediate, orders) = partition(inputs);
        for input in immediate {
            self.apply_input(input);
        }
        for order in orders {
            self.apply_order(order);
        }

        self.step_actions(dt);
        self.step_motion(dt);
        self.step_health(dt);
        self.settle();

        TickOutput {
            state: self.state_snapshot(),
            visualization: self.visualization_snapshot(),
        }
    }

    fn apply_input(&mut self, input: RobotInput) {
        match input {
            RobotInput::InstantActions(message) => self.apply_instant_actions(message),
            RobotInput::ForceError(error) => {
                warn!(robot = %self.spec.robot_id, error_type = %error.error_type, level = %error.error_level, "forced error");
                self.health.raise(error);
            }
            RobotInput::Malformed { topic, reason } => {
                warn!(robot = %self.spec.robot_id, %topic, %reason, "undecodable payload");
                self.health.raise(error_record(
                    ErrorKind::ValidationError,
                    ErrorLevel::Warning,
                    reason,
                    &[("topic", topic.as_str())],
                ));
            }
            RobotInput::Order(order) => self.apply_order(order),
        }
    }

    /// Validate an order and adopt or merge it.
    pub fn apply_order(&mut self, order: Order) {
        let verdict = validate(&order, &self.robot_context());
        match verdict {
            Verdict::AcceptNew(active) => self.adopt(active),
            Verdict::AcceptUpdate(plan) => self.merge(plan),
            Verdict::Duplicate => {
                debug!(robot = %self.spec.robot_id, order_id = %order.order_id, update = order.order_update_id, "duplicate order ignored");
            }
            Verdict::Reject(reason) => {
                warn!(robot = %self.spec.robot_id, order_id = %order.order_id, update = order.order_update_id, %reason, "order rejected");
                let update = order.order_update_id.to_string();
                self.health.raise(error_record(
                    ErrorKind::ValidationError,
                    ErrorLevel::Warning,
                    reason.to_string(),
                    &[
                        ("orderId", order.order_id.as_str()),
                        ("orderUpdateId", update.as_str()),
                    ],
                ));
            }
        }
    }

    fn register_graph(&mut self, order: &ActiveOrder) {
        for node in &order.nodes {
            self.executor
                .register(ActionOrigin::Node(node.sequence_id), &node.actions);
        }
        for edge in &order.edges {
            self.executor
                .register(ActionOrigin::Edge(edge.sequence_id), &edge.actions);
        }
    }

    fn adopt(&mut self, active: ActiveOrder) {
        let dropped = self.executor.drop_order_actions();
        if dropped > 0 {
            warn!(robot = %self.spec.robot_id, dropped, "dropping unfinished actions of the replaced order");
        }
        self.executor.retire_instants();
        self.register_graph(&active);

        if let Some(first) = active.first_node() {
            self.last_node_id = first.node_id.clone();
            self.last_node_sequence_id = first.sequence_id;
            if let Some(position) = first.node_position.as_ref().filter(|p| !p.map_id.is_empty()) {
                self.map_id = position.map_id.clone();
            }
        }
        self.distance_since_last_node = 0.0;
        self.last_order = Some((active.order_id.clone(), active.order_update_id));
        info!(robot = %self.spec.robot_id, order_id = %active.order_id, update = active.order_update_id, nodes = active.nodes.len(), "order accepted");
        self.order = Some(active);
        self.transition(Phase::AtNode);
    }

    fn merge(&mut self, plan: MergePlan) {
        self.executor.prune_waiting(&plan.removed_action_ids);
        self.register_graph(&plan.merged);

        let merged = plan.merged;
        self.last_order = Some((merged.order_id.clone(), merged.order_update_id));
        info!(robot = %self.spec.robot_id, order_id = %merged.order_id, update = merged.order_update_id, commit = plan.commit_sequence_id, "order updated");

        let extends = merged
            .remaining_nodes(self.last_node_sequence_id)
            .next()
            .is_some();
        self.order = Some(merged);
        if self.phase == Phase::Idle && extends {
            self.transition(Phase::AtNode);
        }
    }

    pub(super) fn transition(&mut self, target: Phase) {
        if !self.phase.can_transition_to(target) {
            warn!(robot = %self.spec.robot_id, from = %self.phase, to = %target, "unexpected phase transition");
        }
        debug!(robot = %self.spec.robot_id, from = %self.phase, to = %target, "phase");
        self.phase = target;
    }

    pub(super) fn halt(&mut self) {
        self.driving = false;
        self.speed = 0.0;
    }

    fn step_actions(&mut self, dt: Duration) {
        let mode = if self.paused {
            ExecMode::Frozen
        } else if self.health.has_fatal() {
            ExecMode::ErrorHalt
        } else {
            ExecMode::Normal
        };
        let events = self.executor.step(dt, mode);
        self.apply_action_events(events);
    }

    /// Start ready actions at `origin`.
    fn start_actions(&mut self, origin: ActionOrigin) {
        let node_id = if self.phase.is_stationary() {
            Some(self.last_node_id.as_str())
        } else {
            None
        };
        let ctx = ActionContext {
            node_id,
            loaded: !self.loads.is_empty(),
            battery_charge: self.health.battery().charge(),
            charge_target: self.charge_target,
            charging_stations: &self.charging_stations,
            timings: &self.timings,
        };
        let events = self.executor.start_ready(origin, &ctx, self.health.faults());
        self.apply_action_events(events);
    }

    pub(super) fn apply_action_events(&mut self, events: Vec<ActionEvent>) {
        for event in events {
            match event {
                ActionEvent::Finished { effect, .. } => self.apply_effect(effect),
                ActionEvent::Failed {
                    action_id,
                    action_type,
                    reason,
                } => {
                    let level = if self.fatal_on_failure {
                        ErrorLevel::Fatal
                    } else {
                        ErrorLevel::Warning
                    };
                    warn!(robot = %self.spec.robot_id, %action_id, %action_type, %reason, %level, "action failed");
                    self.health.raise(error_record(
                        ErrorKind::ActionError,
                        level,
                        reason,
                        &[("actionId", action_id.as_str())],
                    ));
                }
            }
        }
    }

    fn apply_effect(&mut self, effect: ActionEffect) {
        match effect {
            ActionEffect::None => {}
            ActionEffect::Pick { load_id, load_type } => {
                self.loads.push(Load { load_id, load_type });
            }
            ActionEffect::Drop => {
                self.loads.pop();
            }
            ActionEffect::StopCharging => {
                let events = self.executor.finish_charging();
                self.apply_action_events(events);
            }
        }
    }

    fn step_motion(&mut self, dt: Duration) {
        if self.paused || self.health.has_fatal() {
            self.halt();
            return;
        }

        match self.phase {
            Phase::Idle => self.halt(),
            Phase::AtNode => {
                self.start_actions(ActionOrigin::Node(self.last_node_sequence_id));
                if self.can_depart() && !self.health.has_fatal() {
                    self.transition(Phase::Traversing);
                    info!(robot = %self.spec.robot_id, from = %self.last_node_id, "departing");
                    self.drive(dt);
                } else {
                    self.halt();
                }
            }
            Phase::Traversing => self.drive(dt),
        }
    }

    /// Departure needs a released next edge and node, every action at the
    /// current node terminal, the incoming edge's blocking actions terminal
    /// and no HARD action active anywhere.
    fn can_depart(&self) -> bool {
        let Some(order) = &self.order else {
            return false;
        };
        let seq = self.last_node_sequence_id;
        let next_released = match (seq.checked_add(1), seq.checked_add(2)) {
            (Some(edge), Some(node)) => {
                order.edge(edge).map(|e| e.released).unwrap_or(false)
                    && order.node(node).map(|n| n.released).unwrap_or(false)
            }
            _ => false,
        };
        let incoming_clear = seq
            .checked_sub(1)
            .map(|edge| !self.executor.blocking_pending(ActionOrigin::Edge(edge)))
            .unwrap_or(true);

        next_released
            && self.executor.all_terminal(ActionOrigin::Node(seq))
            && incoming_clear
            && !self.executor.hard_active()
    }

    fn drive(&mut self, dt: Duration) {
        let edge_seq = self.last_node_sequence_id.saturating_add(1);
        self.start_actions(ActionOrigin::Edge(edge_seq));
        if self.executor.hard_pending(ActionOrigin::Edge(edge_seq)) || self.health.has_fatal() {
            self.halt();
            return;
        }

        let Some((target, speed, node_id, node_seq)) = self.order.as_ref().and_then(|order| {
            let edge = order.edge(edge_seq)?;
            let node = order.node(edge_seq.checked_add(1)?)?;
            let position = node.node_position.as_ref()?;
            Some((
                MotionTarget::from_node(position, self.motion.default_allowed_deviation),
                effective_speed(edge.max_speed, &self.motion),
                node.node_id.clone(),
                node.sequence_id,
            ))
        }) else {
            warn!(robot = %self.spec.robot_id, edge_seq, "edge target missing from order");
            self.halt();
            return;
        };

        let step = advance(&mut self.pose, &target, speed, dt.as_secs_f64());
        self.driving = true;
        self.speed = speed;
        self.distance_since_last_node += step.distance();

        if step.arrived() {
            self.halt();
            self.last_node_id = node_id;
            self.last_node_sequence_id = node_seq;
            self.distance_since_last_node = 0.0;
            self.transition(Phase::AtNode);
            info!(robot = %self.spec.robot_id, node = %self.last_node_id, seq = node_seq, "arrived");
            self.start_actions(ActionOrigin::Node(node_seq));
        }
    }

    fn step_health(&mut self, dt: Duration) {
        let activity = BatteryActivity {
            driving: self.driving,
            running_actions: self.executor.running_count(),
            charging: self.executor.charging(),
        };
        let outcome = self.health.step(dt.as_secs_f64(), activity);
        if outcome.charge_target_reached {
            let events = self.executor.finish_charging();
            self.apply_action_events(events);
        }
        if self.health.has_fatal() {
            self.halt();
        }
    }

    /// Finish the order when the final node is reached with nothing pending,
    /// and update the new-base request.
    fn settle(&mut self) {
        let Some(order) = &self.order else {
            self.new_base_request = false;
            return;
        };

        let at_final = order
            .final_node()
            .map(|n| n.sequence_id == self.last_node_sequence_id)
            .unwrap_or(true);
        let commit = self.robot_context().commit_point();
        self.new_base_request =
            order.has_horizon() && order.last_released_node() == Some(commit);

        if self.phase == Phase::AtNode && at_final && self.executor.order_actions_terminal() {
            info!(robot = %self.spec.robot_id, order_id = %order.order_id, "order finished");
            self.transition(Phase::Idle);
        }
    }
}
