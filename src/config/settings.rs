//! Typed simulator settings deserialized from the merged configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use vda_protocol::{ErrorLevel, OperatingMode};

use super::defaults::default_start_pose;
use super::effective::ConfigError;
use crate::action::ActionTimings;
use crate::timeout::TimeoutConfig;

/// Fleet-wide identity and naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSettings {
    /// Number of robots generated when `robots` is empty
    pub robot_count: usize,
    /// Manufacturer stamped into every header
    pub manufacturer: String,
    /// Protocol version stamped into every header
    pub version: String,
    /// Topic interface prefix
    pub topic_prefix: String,
    /// Reported operating mode
    pub operating_mode: OperatingMode,
}

/// Tick cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickSettings {
    /// Wall-clock tick period in milliseconds
    pub period_ms: u64,
    /// Simulated seconds per wall-clock second
    pub time_scale: f64,
}

/// Motion limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    /// Speed used on edges without `maxSpeed` (m/s)
    pub default_speed: f64,
    /// Hard cap on the robot's speed (m/s)
    pub max_speed: f64,
    /// Arrival tolerance for nodes without `allowedDeviationXY` (m)
    pub default_allowed_deviation: f64,
}

/// Battery model parameters. Rates are percent per simulated second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatterySettings {
    pub initial_charge: f64,
    pub drain_driving_per_second: f64,
    pub drain_action_per_second: f64,
    pub charge_per_second: f64,
    /// Charge level at which a running startCharging finishes
    pub charge_target: f64,
    /// Below this level a low-battery warning is raised
    pub low_threshold: f64,
    /// Node ids where startCharging is permitted
    pub charging_stations: Vec<String>,
}

/// Action execution parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionSettings {
    /// No action may stay RUNNING longer than this
    pub max_seconds: u64,
    /// Escalate ACTION_ERROR to FATAL
    pub fatal_on_failure: bool,
    /// Probability that a starting action fails
    pub failure_probability: f64,
    /// Simulated duration per actionType, in seconds
    pub durations: BTreeMap<String, f64>,
}

/// Stochastic error injection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorSettings {
    /// Probability per tick of raising a DEVICE_ERROR
    pub probability_per_tick: f64,
    /// Level of randomly raised errors
    pub level: ErrorLevel,
    /// RNG seed; entropy-seeded when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Start pose in the map frame (theta in radians).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartPose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

/// Explicitly configured robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotSettings {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<StartPose>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_id: Option<String>,
}

/// Fully resolved identity and start state of one robot.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotSpec {
    /// Zero-based position in the fleet
    pub index: usize,
    pub robot_id: String,
    pub serial_number: String,
    pub start: StartPose,
    pub map_id: String,
}

impl RobotSpec {
    /// A robot at the origin, for tests and one-off simulations.
    pub fn at(robot_id: impl Into<String>, x: f64, y: f64, theta: f64) -> Self {
        Self {
            index: 0,
            robot_id: robot_id.into(),
            serial_number: "SN1000".to_string(),
            start: StartPose { x, y, theta },
            map_id: String::new(),
        }
    }
}

/// Complete simulator configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub fleet: FleetSettings,
    pub tick: TickSettings,
    pub motion: MotionSettings,
    pub battery: BatterySettings,
    pub actions: ActionSettings,
    pub errors: ErrorSettings,
    pub robots: Vec<RobotSettings>,
}

impl SimConfig {
    /// Deserialize from a merged JSON document and validate.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_value(value)
            .map_err(|e| ConfigError::ParseError(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timeouts()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if !(self.tick.time_scale > 0.0 && self.tick.time_scale.is_finite()) {
            return Err(ConfigError::ValidationError(
                "tick.time_scale must be > 0".to_string(),
            ));
        }

        if !(self.motion.default_speed > 0.0) || !(self.motion.max_speed > 0.0) {
            return Err(ConfigError::ValidationError(
                "motion speeds must be > 0".to_string(),
            ));
        }

        if self.motion.default_allowed_deviation < 0.0 {
            return Err(ConfigError::ValidationError(
                "motion.default_allowed_deviation must be >= 0".to_string(),
            ));
        }

        let battery = &self.battery;
        if !(0.0..=100.0).contains(&battery.initial_charge)
            || !(0.0..=100.0).contains(&battery.charge_target)
            || !(0.0..=100.0).contains(&battery.low_threshold)
        {
            return Err(ConfigError::ValidationError(
                "battery levels must be in [0, 100]".to_string(),
            ));
        }
        if battery.drain_driving_per_second < 0.0
            || battery.drain_action_per_second < 0.0
            || battery.charge_per_second < 0.0
        {
            return Err(ConfigError::ValidationError(
                "battery rates must be >= 0".to_string(),
            ));
        }

        for (name, p) in [
            ("actions.failure_probability", self.actions.failure_probability),
            ("errors.probability_per_tick", self.errors.probability_per_tick),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be in [0, 1], got {}",
                    name, p
                )));
            }
        }

        self.action_timings()?;

        let mut seen = std::collections::HashSet::new();
        for robot in &self.robots {
            if robot.id.is_empty() {
                return Err(ConfigError::ValidationError(
                    "robot id must not be empty".to_string(),
                ));
            }
            if !seen.insert(robot.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate robot id: {}",
                    robot.id
                )));
            }
        }

        Ok(())
    }

    /// Timeout bounds derived from the tick and action settings.
    pub fn timeouts(&self) -> TimeoutConfig {
        TimeoutConfig {
            max_action_seconds: self.actions.max_seconds,
            tick_period_ms: self.tick.period_ms,
        }
    }

    /// Per-action-type durations.
    pub fn action_timings(&self) -> Result<ActionTimings, ConfigError> {
        ActionTimings::from_seconds(&self.actions.durations).map_err(ConfigError::ValidationError)
    }

    /// Simulated time advanced by one tick.
    pub fn tick_delta(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick.period_ms).mul_f64(self.tick.time_scale)
    }

    /// Resolve the robots to simulate.
    ///
    /// Explicit `robots` entries win; otherwise `robot_count` robots named
    /// `robot_1..robot_N` are generated.
    pub fn robot_specs(&self) -> Vec<RobotSpec> {
        if !self.robots.is_empty() {
            return self
                .robots
                .iter()
                .enumerate()
                .map(|(index, robot)| RobotSpec {
                    index,
                    robot_id: robot.id.clone(),
                    serial_number: robot
                        .serial_number
                        .clone()
                        .unwrap_or_else(|| default_serial(index)),
                    start: robot.start.unwrap_or_else(|| default_start_pose(index + 1)),
                    map_id: robot.map_id.clone().unwrap_or_default(),
                })
                .collect();
        }

        (0..self.fleet.robot_count)
            .map(|index| RobotSpec {
                index,
                robot_id: format!("robot_{}", index + 1),
                serial_number: default_serial(index),
                start: default_start_pose(index + 1),
                map_id: String::new(),
            })
            .collect()
    }
}

fn default_serial(index: usize) -> String {
    format!("SN{}", 1001 + index)
}
