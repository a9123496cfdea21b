//! Action executor
//!
//! Tracks the lifecycle of every order and instant action of one robot:
//! WAITING → INITIALIZING → RUNNING → FINISHED, or FAILED at any point.
//! Starting follows list order per node/edge and honours blocking types;
//! progress is driven by simulated time only.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, info, warn};
use vda_protocol::{Action, ActionState, ActionStatus, BlockingType};

use super::kind::{ActionContext, ActionEffect, ActionKind, ActionPlan, Completion};
use crate::health::FaultInjector;
use crate::timeout::ActionTimeout;

/// Result description for actions dropped by a cancel
pub const CANCELLED: &str = "cancelled";

/// Instant action states kept in the snapshot
pub const INSTANT_STATE_LIMIT: usize = 64;

/// Retired instant ids still recognized as re-deliveries
pub const INSTANT_ID_MEMORY: usize = 1024;

/// Where an action is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOrigin {
    /// Node with this sequence id
    Node(u32),
    /// Edge with this sequence id
    Edge(u32),
    Instant,
}

/// How far actions may progress this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Normal,
    /// A FATAL error is active: only RUNNING actions progress
    ErrorHalt,
    /// Paused: all timers freeze
    Frozen,
}

/// Lifecycle outcome the robot has to react to
#[derive(Debug, Clone, PartialEq)]
pub enum ActionEvent {
    Finished {
        action_id: String,
        effect: ActionEffect,
    },
    Failed {
        action_id: String,
        action_type: String,
        reason: String,
    },
}

/// One tracked action
#[derive(Debug, Clone)]
pub struct TrackedAction {
    pub action: Action,
    pub origin: ActionOrigin,
    pub status: ActionStatus,
    /// Simulated time spent RUNNING
    pub elapsed: Duration,
    pub result: Option<String>,
    plan: Option<ActionPlan>,
}

impl TrackedAction {
    fn new(action: Action, origin: ActionOrigin) -> Self {
        Self {
            action,
            origin,
            status: ActionStatus::Waiting,
            elapsed: Duration::ZERO,
            result: None,
            plan: None,
        }
    }

    fn is_hard(&self) -> bool {
        self.action.blocking_type == BlockingType::Hard
    }

    fn is_charging(&self) -> bool {
        matches!(
            self.plan,
            Some(ActionPlan {
                completion: Completion::Charged,
                ..
            })
        )
    }

    fn fail(&mut self, reason: impl Into<String>) -> ActionEvent {
        let reason = reason.into();
        self.status = ActionStatus::Failed;
        self.result = Some(reason.clone());
        ActionEvent::Failed {
            action_id: self.action.action_id.clone(),
            action_type: self.action.action_type.clone(),
            reason,
        }
    }

    fn finish(&mut self) -> ActionEvent {
        self.status = ActionStatus::Finished;
        let effect = self
            .plan
            .as_ref()
            .map(|p| p.effect.clone())
            .unwrap_or(ActionEffect::None);
        ActionEvent::Finished {
            action_id: self.action.action_id.clone(),
            effect,
        }
    }
}

#[derive(Debug, Default)]
pub struct ActionExecutor {
    actions: Vec<TrackedAction>,
    /// Ids of instant actions no longer reported, oldest first
    retired_instants: VecDeque<String>,
    timeout: ActionTimeout,
}

impl ActionExecutor {
    pub fn new(timeout: ActionTimeout) -> Self {
        Self {
            actions: Vec::new(),
            retired_instants: VecDeque::new(),
            timeout,
        }
    }

    /// Track `actions` at `origin` as WAITING. Order action ids already
    /// tracked are kept as they are.
    pub fn register(&mut self, origin: ActionOrigin, actions: &[Action]) {
        for action in actions {
            if self.is_order_action(&action.action_id) {
                continue;
            }
            self.actions
                .push(TrackedAction::new(action.clone(), origin));
        }
    }

    /// Track an instant action that was applied immediately.
    pub fn record_instant(&mut self, action: &Action, status: ActionStatus, result: Option<String>) {
        let mut tracked = TrackedAction::new(action.clone(), ActionOrigin::Instant);
        tracked.status = status;
        tracked.result = result;
        self.actions.push(tracked);

        let instants = self
            .actions
            .iter()
            .filter(|t| t.origin == ActionOrigin::Instant)
            .count();
        if instants > INSTANT_STATE_LIMIT {
            if let Some(oldest) = self
                .actions
                .iter()
                .position(|t| t.origin == ActionOrigin::Instant)
            {
                let retired = self.actions.remove(oldest);
                self.remember_instant(retired.action.action_id);
            }
        }
    }

    /// Stop reporting instant actions. Their ids are still recognized by
    /// [`instant_seen`](Self::instant_seen).
    pub fn retire_instants(&mut self) {
        let (instants, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.actions)
            .into_iter()
            .partition(|t| t.origin == ActionOrigin::Instant);
        self.actions = rest;
        for tracked in instants {
            self.remember_instant(tracked.action.action_id);
        }
    }

    fn remember_instant(&mut self, action_id: String) {
        self.retired_instants.push_back(action_id);
        if self.retired_instants.len() > INSTANT_ID_MEMORY {
            self.retired_instants.pop_front();
        }
    }

    /// Advance initialization and running timers by `dt`.
    pub fn step(&mut self, dt: Duration, mode: ExecMode) -> Vec<ActionEvent> {
        let mut events = Vec::new();
        if mode == ExecMode::Frozen {
            return events;
        }

        for tracked in &mut self.actions {
            if tracked.status == ActionStatus::Initializing && mode == ExecMode::Normal {
                tracked.status = ActionStatus::Running;
                debug!(action_id = %tracked.action.action_id, "action running");
            }
            if tracked.status != ActionStatus::Running {
                continue;
            }

            tracked.elapsed += dt;
            let done = match tracked.plan.as_ref().map(|p| p.completion) {
                Some(Completion::After(duration)) => tracked.elapsed >= duration,
                Some(Completion::Charged) => false,
                None => true,
            };

            if done {
                info!(action_id = %tracked.action.action_id, action_type = %tracked.action.action_type, "action finished");
                events.push(tracked.finish());
            } else if let Some(reason) = self.timeout.check(tracked.elapsed).result_description() {
                warn!(action_id = %tracked.action.action_id, "action timed out");
                events.push(tracked.fail(reason));
            }
        }

        events
    }

    /// Start WAITING actions at `origin` in list order.
    ///
    /// Nothing starts while a HARD action is active. A HARD action starts
    /// only when no other action is active and blocks every later action
    /// until it is terminal.
    pub fn start_ready(
        &mut self,
        origin: ActionOrigin,
        ctx: &ActionContext<'_>,
        faults: &mut FaultInjector,
    ) -> Vec<ActionEvent> {
        let mut events = Vec::new();
        if self.hard_active() {
            return events;
        }

        let mut any_active = self.any_active();
        for index in 0..self.actions.len() {
            let tracked = &self.actions[index];
            if tracked.origin != origin {
                continue;
            }
            if tracked.status.is_active() && tracked.is_hard() {
                break;
            }
            if tracked.status != ActionStatus::Waiting {
                continue;
            }
            let hard = tracked.is_hard();
            if hard && any_active {
                break;
            }

            let tracked = &mut self.actions[index];
            let planned = ActionKind::parse(&tracked.action.action_type)
                .ok_or_else(|| format!("unknown action type '{}'", tracked.action.action_type))
                .and_then(|kind| kind.plan(&tracked.action, ctx));

            match planned {
                Err(reason) => {
                    warn!(action_id = %tracked.action.action_id, %reason, "action failed to initialize");
                    events.push(tracked.fail(reason));
                }
                Ok(plan) => {
                    if let Some(reason) = faults.check(&tracked.action) {
                        warn!(action_id = %tracked.action.action_id, %reason, "injected action failure");
                        events.push(tracked.fail(reason));
                        continue;
                    }
                    debug!(action_id = %tracked.action.action_id, "action initializing");
                    tracked.plan = Some(plan);
                    tracked.status = ActionStatus::Initializing;
                    any_active = true;
                    if hard {
                        break;
                    }
                }
            }
        }

        events
    }

    /// Fail every non-terminal order action with `reason`.
    pub fn fail_pending(&mut self, reason: &str) -> Vec<ActionEvent> {
        self.actions
            .iter_mut()
            .filter(|t| t.origin != ActionOrigin::Instant && !t.status.is_terminal())
            .map(|t| t.fail(reason))
            .collect()
    }

    /// Finish running charge actions.
    pub fn finish_charging(&mut self) -> Vec<ActionEvent> {
        self.actions
            .iter_mut()
            .filter(|t| t.status == ActionStatus::Running && t.is_charging())
            .map(|t| t.finish())
            .collect()
    }

    /// Stop tracking WAITING actions whose ids are in `ids`.
    pub fn prune_waiting(&mut self, ids: &[String]) {
        self.actions
            .retain(|t| t.status != ActionStatus::Waiting || !ids.contains(&t.action.action_id));
    }

    /// Stop tracking all order actions; instant actions stay. Returns the
    /// number of non-terminal actions dropped.
    pub fn drop_order_actions(&mut self) -> usize {
        let dropped = self
            .actions
            .iter()
            .filter(|t| t.origin != ActionOrigin::Instant && !t.status.is_terminal())
            .count();
        self.actions.retain(|t| t.origin == ActionOrigin::Instant);
        dropped
    }

    pub fn contains(&self, action_id: &str) -> bool {
        self.actions.iter().any(|t| t.action.action_id == action_id)
    }

    /// An instant action with this id was already applied.
    pub fn instant_seen(&self, action_id: &str) -> bool {
        self.actions
            .iter()
            .any(|t| t.origin == ActionOrigin::Instant && t.action.action_id == action_id)
            || self.retired_instants.iter().any(|id| id == action_id)
    }

    pub fn is_order_action(&self, action_id: &str) -> bool {
        self.actions
            .iter()
            .any(|t| t.origin != ActionOrigin::Instant && t.action.action_id == action_id)
    }

    pub fn get(&self, action_id: &str) -> Option<&TrackedAction> {
        self.actions.iter().find(|t| t.action.action_id == action_id)
    }

    /// All actions at `origin` are FINISHED or FAILED.
    pub fn all_terminal(&self, origin: ActionOrigin) -> bool {
        self.actions
            .iter()
            .filter(|t| t.origin == origin)
            .all(|t| t.status.is_terminal())
    }

    /// Every tracked order action is terminal.
    pub fn order_actions_terminal(&self) -> bool {
        self.actions
            .iter()
            .filter(|t| t.origin != ActionOrigin::Instant)
            .all(|t| t.status.is_terminal())
    }

    /// Some action at `origin` with at least SOFT blocking is not terminal.
    pub fn blocking_pending(&self, origin: ActionOrigin) -> bool {
        self.actions.iter().any(|t| {
            t.origin == origin
                && t.action.blocking_type != BlockingType::None
                && !t.status.is_terminal()
        })
    }

    /// Some HARD action at `origin` is not terminal.
    pub fn hard_pending(&self, origin: ActionOrigin) -> bool {
        self.actions
            .iter()
            .any(|t| t.origin == origin && t.is_hard() && !t.status.is_terminal())
    }

    /// A HARD action is INITIALIZING or RUNNING anywhere.
    pub fn hard_active(&self) -> bool {
        self.actions
            .iter()
            .any(|t| t.is_hard() && t.status.is_active())
    }

    fn any_active(&self) -> bool {
        self.actions.iter().any(|t| t.status.is_active())
    }

    /// Number of RUNNING actions other than charging
    pub fn running_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|t| t.status == ActionStatus::Running && !t.is_charging())
            .count()
    }

    /// A charge action is RUNNING
    pub fn charging(&self) -> bool {
        self.actions
            .iter()
            .any(|t| t.status == ActionStatus::Running && t.is_charging())
    }

    /// Wire view of every tracked action
    pub fn action_states(&self) -> Vec<ActionState> {
        self.actions
            .iter()
            .map(|t| ActionState {
                action_id: t.action.action_id.clone(),
                action_type: Some(t.action.action_type.clone()),
                action_description: t.action.action_description.clone(),
                action_status: t.status,
                result_description: t.result.clone(),
            })
            .collect()
    }

    pub fn tracked(&self) -> &[TrackedAction] {
        &self.actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionTimings;
    use std::collections::BTreeMap;

    const TICK: Duration = Duration::from_millis(100);

    struct Fixture {
        timings: ActionTimings,
        stations: Vec<String>,
        faults: FaultInjector,
    }

    impl Fixture {
        fn new() -> Self {
            let table: BTreeMap<String, f64> = [("pick", 0.3), ("drop", 0.3), ("wait", 0.2)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
            Self {
                timings: ActionTimings::from_seconds(&table).unwrap(),
                stations: vec!["dock".to_string()],
                faults: FaultInjector::default(),
            }
        }

        fn start(&mut self, executor: &mut ActionExecutor, origin: ActionOrigin) -> Vec<ActionEvent> {
            let ctx = ActionContext {
                node_id: Some("n0"),
                loaded: false,
                battery_charge: 50.0,
                charge_target: 100.0,
                charging_stations: &self.stations,
                timings: &self.timings,
            };
            executor.start_ready(origin, &ctx, &mut self.faults)
        }
    }

    fn ctx_at<'a>(fx: &'a Fixture, node_id: &'a str) -> ActionContext<'a> {
        ActionContext {
            node_id: Some(node_id),
            loaded: false,
            battery_charge: 50.0,
            charge_target: 100.0,
            charging_stations: &fx.stations,
            timings: &fx.timings,
        }
    }

    fn status(executor: &ActionExecutor, id: &str) -> ActionStatus {
        executor.get(id).unwrap().status
    }

    fn wait(id: &str, blocking: BlockingType) -> Action {
        Action::new("wait", id, blocking)
    }

    #[test]
    fn test_lifecycle_happy_path() {
        let mut fx = Fixture::new();
        let mut executor = ActionExecutor::default();
        executor.register(ActionOrigin::Node(0), &[wait("w1", BlockingType::None)]);
        assert_eq!(status(&executor, "w1"), ActionStatus::Waiting);

        fx.start(&mut executor, ActionOrigin::Node(0));
        assert_eq!(status(&executor, "w1"), ActionStatus::Initializing);

        assert!(executor.step(TICK, ExecMode::Normal).is_empty());
        assert_eq!(status(&executor, "w1"), ActionStatus::Running);

        let events = executor.step(TICK, ExecMode::Normal);
        assert_eq!(status(&executor, "w1"), ActionStatus::Finished);
        assert_eq!(
            events,
            vec![ActionEvent::Finished {
                action_id: "w1".to_string(),
                effect: ActionEffect::None
            }]
        );
    }

    #[test]
    fn test_hard_blocks_later_actions() {
        let mut fx = Fixture::new();
        let mut executor = ActionExecutor::default();
        executor.register(
            ActionOrigin::Node(0),
            &[
                wait("soft", BlockingType::Soft),
                wait("hard", BlockingType::Hard),
                wait("after", BlockingType::None),
            ],
        );

        fx.start(&mut executor, ActionOrigin::Node(0));
        assert_eq!(status(&executor, "soft"), ActionStatus::Initializing);
        assert_eq!(status(&executor, "hard"), ActionStatus::Waiting);
        assert_eq!(status(&executor, "after"), ActionStatus::Waiting);

        executor.step(TICK, ExecMode::Normal);
        executor.step(TICK, ExecMode::Normal);
        assert_eq!(status(&executor, "soft"), ActionStatus::Finished);

        fx.start(&mut executor, ActionOrigin::Node(0));
        assert_eq!(status(&executor, "hard"), ActionStatus::Initializing);
        assert_eq!(status(&executor, "after"), ActionStatus::Waiting);
        assert!(executor.hard_active());

        executor.step(TICK, ExecMode::Normal);
        fx.start(&mut executor, ActionOrigin::Node(0));
        assert_eq!(status(&executor, "after"), ActionStatus::Waiting);

        executor.step(TICK, ExecMode::Normal);
        assert_eq!(status(&executor, "hard"), ActionStatus::Finished);
        fx.start(&mut executor, ActionOrigin::Node(0));
        assert_eq!(status(&executor, "after"), ActionStatus::Initializing);
    }

    #[test]
    fn test_none_actions_run_concurrently() {
        let mut fx = Fixture::new();
        let mut executor = ActionExecutor::default();
        executor.register(
            ActionOrigin::Edge(1),
            &[wait("a", BlockingType::None), wait("b", BlockingType::Soft)],
        );

        fx.start(&mut executor, ActionOrigin::Edge(1));
        assert_eq!(status(&executor, "a"), ActionStatus::Initializing);
        assert_eq!(status(&executor, "b"), ActionStatus::Initializing);
        assert!(executor.blocking_pending(ActionOrigin::Edge(1)));
        assert!(!executor.hard_pending(ActionOrigin::Edge(1)));
    }

    #[test]
    fn test_planning_failure_is_terminal() {
        let mut fx = Fixture::new();
        let mut executor = ActionExecutor::default();
        executor.register(
            ActionOrigin::Node(0),
            &[Action::new("drop", "d1", BlockingType::Hard), wait("w1", BlockingType::None)],
        );

        let events = fx.start(&mut executor, ActionOrigin::Node(0));
        assert_eq!(status(&executor, "d1"), ActionStatus::Failed);
        assert_eq!(executor.get("d1").unwrap().result.as_deref(), Some("no load to drop"));
        assert_eq!(status(&executor, "w1"), ActionStatus::Initializing);
        assert!(matches!(&events[0], ActionEvent::Failed { action_id, .. } if action_id == "d1"));
    }

    #[test]
    fn test_injected_failure() {
        let mut fx = Fixture::new();
        fx.faults.inject_error("pick", "gripper jammed");
        let mut executor = ActionExecutor::default();
        executor.register(ActionOrigin::Node(0), &[Action::new("pick", "p1", BlockingType::Hard)]);

        fx.start(&mut executor, ActionOrigin::Node(0));
        assert_eq!(status(&executor, "p1"), ActionStatus::Failed);
        assert!(executor.all_terminal(ActionOrigin::Node(0)));
    }

    #[test]
    fn test_frozen_and_error_halt_modes() {
        let mut fx = Fixture::new();
        let mut executor = ActionExecutor::default();
        executor.register(
            ActionOrigin::Node(0),
            &[wait("running", BlockingType::None), wait("other", BlockingType::None)],
        );
        fx.start(&mut executor, ActionOrigin::Node(0));
        executor.step(TICK, ExecMode::Normal);
        assert_eq!(status(&executor, "running"), ActionStatus::Running);

        executor.register(ActionOrigin::Node(2), &[wait("late", BlockingType::None)]);
        fx.start(&mut executor, ActionOrigin::Node(2));
        assert_eq!(status(&executor, "late"), ActionStatus::Initializing);

        for _ in 0..10 {
            executor.step(TICK, ExecMode::Frozen);
        }
        assert_eq!(executor.get("running").unwrap().elapsed, TICK);

        executor.step(TICK, ExecMode::ErrorHalt);
        assert_eq!(status(&executor, "running"), ActionStatus::Finished);
        assert_eq!(status(&executor, "late"), ActionStatus::Initializing);
    }

    #[test]
    fn test_timeout_fails_running_action() {
        let mut fx = Fixture::new();
        let mut executor = ActionExecutor::new(ActionTimeout::new(Duration::from_millis(150)));
        executor.register(
            ActionOrigin::Node(0),
            &[wait("long", BlockingType::None).with_parameter("duration", serde_json::json!(10))],
        );
        fx.start(&mut executor, ActionOrigin::Node(0));

        executor.step(TICK, ExecMode::Normal);
        let events = executor.step(TICK, ExecMode::Normal);

        assert_eq!(status(&executor, "long"), ActionStatus::Failed);
        assert_eq!(executor.get("long").unwrap().result.as_deref(), Some("timed out"));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_fail_pending_keeps_instant_and_terminal() {
        let mut fx = Fixture::new();
        let mut executor = ActionExecutor::default();
        executor.register(
            ActionOrigin::Node(0),
            &[wait("done", BlockingType::None), wait("todo", BlockingType::Hard)],
        );
        fx.start(&mut executor, ActionOrigin::Node(0));
        executor.step(TICK, ExecMode::Normal);
        executor.step(TICK, ExecMode::Normal);
        executor.record_instant(
            &Action::new("startPause", "i1", BlockingType::Hard),
            ActionStatus::Finished,
            None,
        );

        let events = executor.fail_pending(CANCELLED);

        assert_eq!(events.len(), 1);
        assert_eq!(status(&executor, "done"), ActionStatus::Finished);
        assert_eq!(status(&executor, "todo"), ActionStatus::Failed);
        assert_eq!(executor.get("todo").unwrap().result.as_deref(), Some(CANCELLED));
        assert_eq!(status(&executor, "i1"), ActionStatus::Finished);
    }

    #[test]
    fn test_register_skips_known_ids() {
        let mut executor = ActionExecutor::default();
        executor.register(ActionOrigin::Node(0), &[wait("w1", BlockingType::None)]);
        executor.register(ActionOrigin::Node(2), &[wait("w1", BlockingType::Hard)]);

        assert_eq!(executor.tracked().len(), 1);
        assert_eq!(executor.get("w1").unwrap().origin, ActionOrigin::Node(0));
    }

    #[test]
    fn test_charging_finishes_on_demand() {
        let fx = Fixture::new();
        let mut executor = ActionExecutor::default();
        executor.register(
            ActionOrigin::Node(0),
            &[Action::new("startCharging", "c1", BlockingType::Hard)],
        );
        let mut faults = FaultInjector::default();
        executor.start_ready(ActionOrigin::Node(0), &ctx_at(&fx, "dock"), &mut faults);
        executor.step(TICK, ExecMode::Normal);

        assert!(executor.charging());
        assert_eq!(executor.running_count(), 0);

        let events = executor.finish_charging();
        assert_eq!(events.len(), 1);
        assert_eq!(status(&executor, "c1"), ActionStatus::Finished);
    }

    #[test]
    fn test_prune_waiting_only() {
        let mut fx = Fixture::new();
        let mut executor = ActionExecutor::default();
        executor.register(ActionOrigin::Node(0), &[wait("started", BlockingType::None)]);
        executor.register(ActionOrigin::Node(2), &[wait("horizon", BlockingType::None)]);
        fx.start(&mut executor, ActionOrigin::Node(0));

        executor.prune_waiting(&["started".to_string(), "horizon".to_string()]);

        assert!(executor.contains("started"));
        assert!(!executor.contains("horizon"));
    }

    #[test]
    fn test_instant_states_are_capped() {
        let mut executor = ActionExecutor::default();
        executor.register(ActionOrigin::Node(0), &[wait("w1", BlockingType::None)]);
        for i in 0..INSTANT_STATE_LIMIT + 10 {
            executor.record_instant(
                &Action::new("stateRequest", &format!("s{}", i), BlockingType::None),
                ActionStatus::Finished,
                None,
            );
        }

        assert_eq!(executor.action_states().len(), INSTANT_STATE_LIMIT + 1);
        assert!(executor.is_order_action("w1"));
        assert!(!executor.contains("s0"));
        assert!(executor.instant_seen("s0"));
        assert!(executor.instant_seen(&format!("s{}", INSTANT_STATE_LIMIT + 9)));
    }

    #[test]
    fn test_retired_instants_stay_recognized() {
        let mut executor = ActionExecutor::default();
        executor.record_instant(
            &Action::new("clearErrors", "c1", BlockingType::None),
            ActionStatus::Finished,
            None,
        );
        executor.register(ActionOrigin::Node(0), &[wait("w1", BlockingType::None)]);

        executor.retire_instants();

        assert_eq!(executor.tracked().len(), 1);
        assert!(executor.instant_seen("c1"));
        assert!(!executor.instant_seen("w1"));
    }

    #[test]
    fn test_order_action_ids_ignore_instants() {
        let mut executor = ActionExecutor::default();
        executor.record_instant(
            &Action::new("stateRequest", "a1", BlockingType::None),
            ActionStatus::Finished,
            None,
        );
        executor.register(ActionOrigin::Node(0), &[wait("a1", BlockingType::None)]);

        assert!(executor.is_order_action("a1"));
        assert_eq!(executor.tracked().len(), 2);
    }
}
