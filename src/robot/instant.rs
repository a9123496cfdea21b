//! Instant action handling
//!
//! Instant actions are applied at the head of the tick, in arrival order,
//! before any order is validated or any motion happens. Each is tracked in
//! the action states; a re-delivered `actionId` is not executed again,
//! even after its state was retired by a new order.

use serde_json::Value;
use tracing::{debug, info, warn};
use vda_protocol::{Action, ActionStatus, ErrorKind, ErrorLevel, InstantActions};

use super::machine::RobotMachine;
use super::phase::Phase;
use crate::action::{ActionKind, CANCELLED};
use crate::health::error_record;

/// Default description of errors raised by `simulateError`
pub const SIMULATED_ERROR: &str = "simulated error";

fn string_param(action: &Action, key: &str) -> Option<String> {
    action
        .parameter(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn number_param(action: &Action, key: &str) -> Result<Option<f64>, String> {
    match action.parameter(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("parameter '{}' must be a number", key)),
    }
}

impl RobotMachine {
    pub(super) fn apply_instant_actions(&mut self, message: InstantActions) {
        for action in message.actions {
            self.apply_instant(action);
        }
    }

    fn apply_instant(&mut self, action: Action) {
        if self.executor.instant_seen(&action.action_id) {
            debug!(robot = %self.spec.robot_id, action_id = %action.action_id, "instant action already seen");
            return;
        }
        if self.executor.is_order_action(&action.action_id) {
            let reason = format!("actionId '{}' is used by an order action", action.action_id);
            self.reject_instant(&action, reason);
            return;
        }

        let Some(kind) = ActionKind::parse(&action.action_type).filter(|k| k.allowed_instant()) else {
            let reason = format!("unsupported instant action '{}'", action.action_type);
            self.reject_instant(&action, reason);
            return;
        };

        let outcome = match kind {
            ActionKind::CancelOrder => self.cancel_order(),
            ActionKind::StartPause => {
                self.paused = true;
                info!(robot = %self.spec.robot_id, "paused");
                Ok(())
            }
            ActionKind::StopPause => {
                self.paused = false;
                info!(robot = %self.spec.robot_id, "resumed");
                Ok(())
            }
            ActionKind::ClearErrors => {
                let error_type = string_param(&action, "errorType");
                let cleared = self.health.clear_errors(error_type.as_deref());
                info!(robot = %self.spec.robot_id, cleared, "errors cleared");
                Ok(())
            }
            ActionKind::StateRequest => Ok(()),
            ActionKind::SimulateError => self.simulate_error(&action),
            ActionKind::InitPosition => self.init_position(&action),
            ActionKind::StopCharging => {
                let events = self.executor.finish_charging();
                self.apply_action_events(events);
                Ok(())
            }
            other => Err(format!("{} cannot run as an instant action", other)),
        };

        match outcome {
            Ok(()) => self
                .executor
                .record_instant(&action, ActionStatus::Finished, None),
            Err(reason) => self.reject_instant(&action, reason),
        }
    }

    fn reject_instant(&mut self, action: &Action, reason: String) {
        warn!(robot = %self.spec.robot_id, action_id = %action.action_id, %reason, "instant action failed");
        self.health.raise(error_record(
            ErrorKind::ValidationError,
            ErrorLevel::Warning,
            reason.clone(),
            &[("actionId", action.action_id.as_str())],
        ));
        self.executor
            .record_instant(action, ActionStatus::Failed, Some(reason));
    }

    /// Drop the active order: pending actions fail as cancelled and the
    /// robot stops where it is. A finished order has nothing left to cancel
    /// and stays in the slot.
    fn cancel_order(&mut self) -> Result<(), String> {
        if self.order.is_none() || self.phase == Phase::Idle {
            return Err("no order to cancel".to_string());
        }

        let cancelled = self.executor.fail_pending(CANCELLED).len();
        let order = self.order.take();
        self.halt();
        self.new_base_request = false;
        self.transition(Phase::Idle);
        info!(
            robot = %self.spec.robot_id,
            order_id = order.as_ref().map(|o| o.order_id.as_str()).unwrap_or_default(),
            cancelled,
            "order cancelled"
        );
        Ok(())
    }

    fn simulate_error(&mut self, action: &Action) -> Result<(), String> {
        let error_type =
            string_param(action, "errorType").unwrap_or_else(|| ErrorKind::DeviceError.to_string());
        let level = match string_param(action, "errorLevel") {
            Some(level) => level.parse::<ErrorLevel>()?,
            None => ErrorLevel::Warning,
        };
        let description =
            string_param(action, "errorDescription").unwrap_or_else(|| SIMULATED_ERROR.to_string());

        let kind = error_type.parse::<ErrorKind>().ok();
        let mut record = error_record(
            kind.unwrap_or(ErrorKind::DeviceError),
            level,
            description,
            &[("actionId", action.action_id.as_str())],
        );
        record.error_type = error_type;
        warn!(robot = %self.spec.robot_id, error_type = %record.error_type, %level, "simulated error raised");
        self.health.raise(record);
        Ok(())
    }

    /// Set the pose from `x`, `y`, `theta`, `lastNodeId` and `mapId`.
    fn init_position(&mut self, action: &Action) -> Result<(), String> {
        if self.phase == Phase::Traversing {
            return Err("cannot initialize position while driving".to_string());
        }
        let x = number_param(action, "x")?.ok_or("missing parameter 'x'")?;
        let y = number_param(action, "y")?.ok_or("missing parameter 'y'")?;
        let theta = number_param(action, "theta")?.unwrap_or(self.pose.theta);

        self.pose.x = x;
        self.pose.y = y;
        self.pose.theta = theta;
        if let Some(node) = string_param(action, "lastNodeId") {
            self.last_node_id = node;
        }
        if let Some(map) = string_param(action, "mapId") {
            self.map_id = map;
        }
        self.position_initialized = true;
        self.distance_since_last_node = 0.0;
        info!(robot = %self.spec.robot_id, x, y, theta, "position initialized");
        Ok(())
    }
}
