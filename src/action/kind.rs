//! Action catalogue
//!
//! Every supported `actionType` maps to an [`ActionKind`] through a static
//! table. Durational kinds carry a pure planning function that turns the
//! wire action plus the robot's situation into an [`ActionPlan`]; kinds
//! without one are handled immediately by the robot when received as
//! instant actions.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde_json::Value;
use vda_protocol::Action;

/// Tagged action type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    Pick,
    Drop,
    Wait,
    StartCharging,
    StopCharging,
    DetectObject,
    FinePositioning,
    CancelOrder,
    StartPause,
    StopPause,
    ClearErrors,
    StateRequest,
    SimulateError,
    InitPosition,
}

/// Robot situation an action is planned against
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    /// Node the robot stands on, if stationary at one
    pub node_id: Option<&'a str>,
    pub loaded: bool,
    pub battery_charge: f64,
    pub charge_target: f64,
    pub charging_stations: &'a [String],
    pub timings: &'a ActionTimings,
}

/// When a running action completes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Completion {
    /// After this much simulated RUNNING time
    After(Duration),
    /// When the battery reaches the charge target
    Charged,
}

/// State change applied when the action FINISHES
#[derive(Debug, Clone, PartialEq)]
pub enum ActionEffect {
    None,
    Pick {
        load_id: Option<String>,
        load_type: Option<String>,
    },
    Drop,
    StopCharging,
}

/// How an action runs once started
#[derive(Debug, Clone, PartialEq)]
pub struct ActionPlan {
    pub completion: Completion,
    pub effect: ActionEffect,
}

impl ActionPlan {
    fn timed(duration: Duration, effect: ActionEffect) -> Self {
        Self {
            completion: Completion::After(duration),
            effect,
        }
    }
}

/// Planning function: `Err` carries the failure description.
pub type PlanFn = fn(&Action, &ActionContext<'_>) -> Result<ActionPlan, String>;

struct ActionEntry {
    kind: ActionKind,
    name: &'static str,
    aliases: &'static [&'static str],
    in_order: bool,
    instant: bool,
    plan: Option<PlanFn>,
}

static ACTION_TABLE: &[ActionEntry] = &[
    ActionEntry {
        kind: ActionKind::Pick,
        name: "pick",
        aliases: &[],
        in_order: true,
        instant: false,
        plan: Some(plan_pick),
    },
    ActionEntry {
        kind: ActionKind::Drop,
        name: "drop",
        aliases: &[],
        in_order: true,
        instant: false,
        plan: Some(plan_drop),
    },
    ActionEntry {
        kind: ActionKind::Wait,
        name: "wait",
        aliases: &[],
        in_order: true,
        instant: false,
        plan: Some(plan_wait),
    },
    ActionEntry {
        kind: ActionKind::StartCharging,
        name: "startCharging",
        aliases: &[],
        in_order: true,
        instant: false,
        plan: Some(plan_start_charging),
    },
    ActionEntry {
        kind: ActionKind::StopCharging,
        name: "stopCharging",
        aliases: &[],
        in_order: true,
        instant: true,
        plan: Some(plan_stop_charging),
    },
    ActionEntry {
        kind: ActionKind::DetectObject,
        name: "detectObject",
        aliases: &[],
        in_order: true,
        instant: false,
        plan: Some(plan_timed),
    },
    ActionEntry {
        kind: ActionKind::FinePositioning,
        name: "finePositioning",
        aliases: &[],
        in_order: true,
        instant: false,
        plan: Some(plan_timed),
    },
    ActionEntry {
        kind: ActionKind::CancelOrder,
        name: "cancelOrder",
        aliases: &[],
        in_order: false,
        instant: true,
        plan: None,
    },
    ActionEntry {
        kind: ActionKind::StartPause,
        name: "startPause",
        aliases: &["pause"],
        in_order: false,
        instant: true,
        plan: None,
    },
    ActionEntry {
        kind: ActionKind::StopPause,
        name: "stopPause",
        aliases: &["resume"],
        in_order: false,
        instant: true,
        plan: None,
    },
    ActionEntry {
        kind: ActionKind::ClearErrors,
        name: "clearErrors",
        aliases: &[],
        in_order: false,
        instant: true,
        plan: None,
    },
    ActionEntry {
        kind: ActionKind::StateRequest,
        name: "stateRequest",
        aliases: &[],
        in_order: false,
        instant: true,
        plan: None,
    },
    ActionEntry {
        kind: ActionKind::SimulateError,
        name: "simulateError",
        aliases: &[],
        in_order: false,
        instant: true,
        plan: None,
    },
    ActionEntry {
        kind: ActionKind::InitPosition,
        name: "initPosition",
        aliases: &[],
        in_order: false,
        instant: true,
        plan: None,
    },
];

impl ActionKind {
    // Rows are in variant order.
    fn entry(&self) -> &'static ActionEntry {
        &ACTION_TABLE[*self as usize]
    }

    /// Resolve a wire `actionType`, including aliases.
    pub fn parse(action_type: &str) -> Option<Self> {
        ACTION_TABLE
            .iter()
            .find(|e| e.name == action_type || e.aliases.contains(&action_type))
            .map(|e| e.kind)
    }

    /// Canonical wire name
    pub fn as_str(&self) -> &'static str {
        self.entry().name
    }

    /// May appear on nodes and edges of an order
    pub fn allowed_in_order(&self) -> bool {
        self.entry().in_order
    }

    /// May be sent as an instant action
    pub fn allowed_instant(&self) -> bool {
        self.entry().instant
    }

    /// Run through the action executor rather than applied immediately
    pub fn is_durational(&self) -> bool {
        self.entry().plan.is_some()
    }

    /// Plan the action against the robot's current situation.
    pub fn plan(&self, action: &Action, ctx: &ActionContext<'_>) -> Result<ActionPlan, String> {
        match self.entry().plan {
            Some(plan) => plan(action, ctx),
            None => Ok(ActionPlan::timed(Duration::ZERO, ActionEffect::None)),
        }
    }

    /// All kinds in table order
    pub fn all() -> impl Iterator<Item = ActionKind> {
        ACTION_TABLE.iter().map(|e| e.kind)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configured simulated duration per action kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionTimings {
    durations: BTreeMap<ActionKind, Duration>,
}

impl ActionTimings {
    /// Build from the `actions.durations` config table (seconds per
    /// actionType). Unknown types and negative durations are errors.
    pub fn from_seconds(table: &BTreeMap<String, f64>) -> Result<Self, String> {
        let mut durations = BTreeMap::new();
        for (name, seconds) in table {
            let kind = ActionKind::parse(name)
                .filter(|k| k.is_durational())
                .ok_or_else(|| format!("actions.durations: unknown action type '{}'", name))?;
            let duration = Some(*seconds)
                .filter(|s| *s >= 0.0)
                .and_then(|s| Duration::try_from_secs_f64(s).ok())
                .ok_or_else(|| {
                    format!("actions.durations.{} must be >= 0, got {}", name, seconds)
                })?;
            durations.insert(kind, duration);
        }
        Ok(Self { durations })
    }

    /// Configured duration, zero when unset
    pub fn duration(&self, kind: ActionKind) -> Duration {
        self.durations.get(&kind).copied().unwrap_or(Duration::ZERO)
    }
}

fn string_param(action: &Action, key: &str) -> Option<String> {
    action.parameter(key).and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    })
}

fn configured(action: &Action, ctx: &ActionContext<'_>) -> Result<Duration, String> {
    let kind = ActionKind::parse(&action.action_type)
        .ok_or_else(|| format!("unknown action type '{}'", action.action_type))?;
    Ok(ctx.timings.duration(kind))
}

fn plan_timed(action: &Action, ctx: &ActionContext<'_>) -> Result<ActionPlan, String> {
    Ok(ActionPlan::timed(configured(action, ctx)?, ActionEffect::None))
}

fn plan_pick(action: &Action, ctx: &ActionContext<'_>) -> Result<ActionPlan, String> {
    if ctx.loaded {
        return Err("already carrying a load".to_string());
    }
    Ok(ActionPlan::timed(
        configured(action, ctx)?,
        ActionEffect::Pick {
            load_id: string_param(action, "loadId"),
            load_type: string_param(action, "loadType"),
        },
    ))
}

fn plan_drop(action: &Action, ctx: &ActionContext<'_>) -> Result<ActionPlan, String> {
    if !ctx.loaded {
        return Err("no load to drop".to_string());
    }
    Ok(ActionPlan::timed(configured(action, ctx)?, ActionEffect::Drop))
}

fn plan_wait(action: &Action, ctx: &ActionContext<'_>) -> Result<ActionPlan, String> {
    let duration = match action.parameter("duration") {
        None => configured(action, ctx)?,
        Some(value) => {
            value
                .as_f64()
                .filter(|s| *s >= 0.0)
                .and_then(|s| Duration::try_from_secs_f64(s).ok())
                .ok_or_else(|| format!("invalid duration parameter: {}", value))?
        }
    };
    Ok(ActionPlan::timed(duration, ActionEffect::None))
}

fn plan_start_charging(_action: &Action, ctx: &ActionContext<'_>) -> Result<ActionPlan, String> {
    let at_station = ctx
        .node_id
        .map(|node| ctx.charging_stations.iter().any(|s| s == node))
        .unwrap_or(false);
    if !at_station {
        return Err("not at a charging station".to_string());
    }
    if ctx.battery_charge >= ctx.charge_target {
        return Ok(ActionPlan::timed(Duration::ZERO, ActionEffect::None));
    }
    Ok(ActionPlan {
        completion: Completion::Charged,
        effect: ActionEffect::None,
    })
}

fn plan_stop_charging(action: &Action, ctx: &ActionContext<'_>) -> Result<ActionPlan, String> {
    Ok(ActionPlan::timed(
        configured(action, ctx)?,
        ActionEffect::StopCharging,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vda_protocol::BlockingType;

    fn timings() -> ActionTimings {
        let table: BTreeMap<String, f64> = [("pick", 3.0), ("wait", 2.0), ("detectObject", 1.5)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        ActionTimings::from_seconds(&table).unwrap()
    }

    fn ctx<'a>(timings: &'a ActionTimings, stations: &'a [String]) -> ActionContext<'a> {
        ActionContext {
            node_id: Some("n1"),
            loaded: false,
            battery_charge: 50.0,
            charge_target: 100.0,
            charging_stations: stations,
            timings,
        }
    }

    #[test]
    fn test_parse_names_and_aliases() {
        assert_eq!(ActionKind::parse("pick"), Some(ActionKind::Pick));
        assert_eq!(ActionKind::parse("pause"), Some(ActionKind::StartPause));
        assert_eq!(ActionKind::parse("resume"), Some(ActionKind::StopPause));
        assert_eq!(ActionKind::parse("teleport"), None);
        assert_eq!(ActionKind::StartPause.as_str(), "startPause");
    }

    #[test]
    fn test_table_covers_every_kind_once() {
        let kinds: Vec<_> = ActionKind::all().collect();
        assert_eq!(kinds.len(), 14);
        for (index, kind) in kinds.iter().enumerate() {
            assert_eq!(*kind as usize, index);
            assert_eq!(ActionKind::parse(kind.as_str()), Some(*kind));
        }
    }

    #[test]
    fn test_scopes() {
        assert!(ActionKind::Pick.allowed_in_order());
        assert!(!ActionKind::Pick.allowed_instant());
        assert!(ActionKind::StopCharging.allowed_in_order());
        assert!(ActionKind::StopCharging.allowed_instant());
        assert!(!ActionKind::CancelOrder.allowed_in_order());
        assert!(!ActionKind::InitPosition.allowed_in_order());
        assert!(!ActionKind::ClearErrors.is_durational());
    }

    #[test]
    fn test_pick_plan_and_failure_when_loaded() {
        let timings = timings();
        let stations = Vec::new();
        let action = Action::new("pick", "a1", BlockingType::Hard).with_parameter("loadId", json!("L7"));

        let plan = ActionKind::Pick.plan(&action, &ctx(&timings, &stations)).unwrap();
        assert_eq!(plan.completion, Completion::After(Duration::from_secs(3)));
        assert_eq!(
            plan.effect,
            ActionEffect::Pick {
                load_id: Some("L7".to_string()),
                load_type: None
            }
        );

        let mut loaded = ctx(&timings, &stations);
        loaded.loaded = true;
        assert!(ActionKind::Pick.plan(&action, &loaded).is_err());
    }

    #[test]
    fn test_drop_requires_load() {
        let timings = timings();
        let stations = Vec::new();
        let action = Action::new("drop", "a1", BlockingType::Hard);

        let err = ActionKind::Drop.plan(&action, &ctx(&timings, &stations)).unwrap_err();
        assert_eq!(err, "no load to drop");
    }

    #[test]
    fn test_wait_duration_parameter() {
        let timings = timings();
        let stations = Vec::new();
        let c = ctx(&timings, &stations);

        let plain = Action::new("wait", "w1", BlockingType::None);
        assert_eq!(
            ActionKind::Wait.plan(&plain, &c).unwrap().completion,
            Completion::After(Duration::from_secs(2))
        );

        let custom = plain.clone().with_parameter("duration", json!(0.5));
        assert_eq!(
            ActionKind::Wait.plan(&custom, &c).unwrap().completion,
            Completion::After(Duration::from_millis(500))
        );

        let invalid = Action::new("wait", "w2", BlockingType::None).with_parameter("duration", json!("soon"));
        assert!(ActionKind::Wait.plan(&invalid, &c).is_err());

        let negative = Action::new("wait", "w3", BlockingType::None).with_parameter("duration", json!(-1));
        assert!(ActionKind::Wait.plan(&negative, &c).is_err());
    }

    #[test]
    fn test_start_charging_needs_station() {
        let timings = timings();
        let action = Action::new("startCharging", "c1", BlockingType::Hard);

        let none: Vec<String> = Vec::new();
        assert_eq!(
            ActionKind::StartCharging.plan(&action, &ctx(&timings, &none)).unwrap_err(),
            "not at a charging station"
        );

        let stations = vec!["n1".to_string()];
        let plan = ActionKind::StartCharging
            .plan(&action, &ctx(&timings, &stations))
            .unwrap();
        assert_eq!(plan.completion, Completion::Charged);
    }

    #[test]
    fn test_timings_reject_unknown_and_negative() {
        let unknown: BTreeMap<String, f64> = [("teleport".to_string(), 1.0)].into_iter().collect();
        assert!(ActionTimings::from_seconds(&unknown).unwrap_err().contains("teleport"));

        let instant_only: BTreeMap<String, f64> = [("cancelOrder".to_string(), 1.0)].into_iter().collect();
        assert!(ActionTimings::from_seconds(&instant_only).is_err());

        let negative: BTreeMap<String, f64> = [("pick".to_string(), -2.0)].into_iter().collect();
        assert!(ActionTimings::from_seconds(&negative).is_err());
    }

    #[test]
    fn test_unset_duration_is_zero() {
        let timings = timings();
        assert_eq!(timings.duration(ActionKind::FinePositioning), Duration::ZERO);
        assert_eq!(timings.duration(ActionKind::DetectObject), Duration::from_millis(1500));
    }
}
