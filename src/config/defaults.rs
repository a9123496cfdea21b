//! Built-in simulator defaults (layer 1)
//!
//! Hardcoded defaults for all configuration values.

use std::collections::BTreeMap;

use vda_protocol::{ErrorLevel, OperatingMode, DEFAULT_MANUFACTURER, DEFAULT_TOPIC_PREFIX, PROTOCOL_VERSION};

use super::settings::{
    ActionSettings, BatterySettings, ErrorSettings, FleetSettings, MotionSettings, SimConfig,
    StartPose, TickSettings,
};

/// Start poses for the first five robots of a generated fleet.
const START_POSES: [(f64, f64, f64); 5] = [
    (200.0, 200.0, 0.0),
    (150.0, 150.0, 90.0),
    (-150.0, -150.0, 180.0),
    (200.0, -200.0, 270.0),
    (-300.0, 300.0, 45.0),
];

/// Start pose for the robot with 1-based `number`; origin beyond the table.
///
/// Table angles are in degrees and converted to radians.
pub fn default_start_pose(number: usize) -> StartPose {
    number
        .checked_sub(1)
        .and_then(|i| START_POSES.get(i))
        .map(|&(x, y, deg)| StartPose {
            x,
            y,
            theta: f64::to_radians(deg),
        })
        .unwrap_or_default()
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            robot_count: 3,
            manufacturer: DEFAULT_MANUFACTURER.to_string(),
            version: PROTOCOL_VERSION.to_string(),
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            operating_mode: OperatingMode::Automatic,
        }
    }
}

impl Default for TickSettings {
    fn default() -> Self {
        Self {
            period_ms: 100,
            time_scale: 1.0,
        }
    }
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            default_speed: 1.0,
            max_speed: 2.0,
            default_allowed_deviation: 0.1,
        }
    }
}

impl Default for BatterySettings {
    fn default() -> Self {
        Self {
            initial_charge: 100.0,
            drain_driving_per_second: 0.05,
            drain_action_per_second: 0.01,
            charge_per_second: 1.0,
            charge_target: 100.0,
            low_threshold: 10.0,
            charging_stations: Vec::new(),
        }
    }
}

impl Default for ActionSettings {
    fn default() -> Self {
        let durations: BTreeMap<String, f64> = [
            ("pick", 3.0),
            ("drop", 3.0),
            ("wait", 2.0),
            ("stopCharging", 1.0),
            ("detectObject", 2.0),
            ("finePositioning", 2.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            max_seconds: 300,
            fatal_on_failure: false,
            failure_probability: 0.0,
            durations,
        }
    }
}

impl Default for ErrorSettings {
    fn default() -> Self {
        Self {
            probability_per_tick: 0.0,
            level: ErrorLevel::Warning,
            seed: None,
        }
    }
}

/// Built-in default configuration values
#[derive(Debug, Clone, Default)]
pub struct BuiltinDefaults {
    config: SimConfig,
}

impl BuiltinDefaults {
    /// The defaults as a typed config.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        let config = defaults.config();
        assert_eq!(config.fleet.robot_count, 3);
        assert_eq!(config.fleet.manufacturer, "DummyManufacturer");
        assert_eq!(config.tick.period_ms, 100);
        assert_eq!(config.actions.max_seconds, 300);
        assert!(!config.actions.fatal_on_failure);
        assert!(config.robots.is_empty());
    }

    #[test]
    fn test_to_value() {
        let value = BuiltinDefaults::default().to_value();

        assert_eq!(value["tick"]["period_ms"], 100);
        assert_eq!(value["fleet"]["topic_prefix"], "uagv");
        assert_eq!(value["actions"]["durations"]["pick"], 3.0);
        assert_eq!(value["errors"]["level"], "WARNING");
    }

    #[test]
    fn test_default_start_pose_table() {
        let first = default_start_pose(1);
        assert_eq!((first.x, first.y), (200.0, 200.0));

        let second = default_start_pose(2);
        assert!((second.theta - std::f64::consts::FRAC_PI_2).abs() < 1e-9);

        let beyond = default_start_pose(6);
        assert_eq!((beyond.x, beyond.y, beyond.theta), (0.0, 0.0, 0.0));

        let zero = default_start_pose(0);
        assert_eq!((zero.x, zero.y), (0.0, 0.0));
    }
}
