//! Battery & error model
//!
//! Owns the robot's battery, its active error records, the stochastic error
//! source and the action fault injector.

mod battery;
mod fault;
mod registry;

pub use battery::{Battery, BatteryActivity, BatteryEvent};
pub use fault::{FaultConfig, FaultInjector, RANDOM_FAILURE};
pub use registry::{error_record, ErrorRegistry};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};
use vda_protocol::{AgvError, ErrorKind, ErrorLevel};

use crate::config::SimConfig;

/// Description of the low battery warning
pub const BATTERY_LOW: &str = "battery low";

/// Description of the depleted battery error
pub const BATTERY_DEPLETED: &str = "battery depleted";

/// Description of randomly injected device faults
pub const RANDOM_DEVICE_FAULT: &str = "simulated device fault";

/// Outcome of one health step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthStep {
    /// A running charge action should finish
    pub charge_target_reached: bool,
}

#[derive(Debug)]
pub struct HealthModel {
    battery: Battery,
    errors: ErrorRegistry,
    faults: FaultInjector,
    rng: StdRng,
    error_probability: f64,
    error_level: ErrorLevel,
}

impl HealthModel {
    /// Health model for the robot at `index` in the fleet. With a configured
    /// seed every robot gets its own deterministic stream.
    pub fn new(config: &SimConfig, index: usize) -> Self {
        let base = config
            .errors
            .seed
            .map(|seed| seed.wrapping_add(2 * index as u64));
        let rng = match base {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            battery: Battery::new(config.battery.clone()),
            errors: ErrorRegistry::new(),
            faults: FaultInjector::new(
                config.actions.failure_probability,
                base.map(|seed| seed.wrapping_add(1)),
            ),
            rng,
            error_probability: config.errors.probability_per_tick,
            error_level: config.errors.level,
        }
    }

    /// Advance battery and stochastic errors by one tick.
    pub fn step(&mut self, dt_seconds: f64, activity: BatteryActivity) -> HealthStep {
        let mut outcome = HealthStep::default();

        for event in self.battery.step(dt_seconds, activity) {
            match event {
                BatteryEvent::ChargeTargetReached => outcome.charge_target_reached = true,
                BatteryEvent::Low => {
                    warn!(charge = self.battery.charge(), "battery low");
                    self.raise(error_record(
                        ErrorKind::DeviceError,
                        ErrorLevel::Warning,
                        BATTERY_LOW,
                        &[],
                    ));
                }
                BatteryEvent::Depleted => {
                    self.raise(error_record(
                        ErrorKind::DeviceError,
                        ErrorLevel::Fatal,
                        BATTERY_DEPLETED,
                        &[],
                    ));
                }
            }
        }

        if self.error_probability > 0.0 && self.rng.gen::<f64>() < self.error_probability {
            let level = self.error_level;
            if self.raise(error_record(ErrorKind::DeviceError, level, RANDOM_DEVICE_FAULT, &[])) {
                warn!(%level, "injected random device fault");
            }
        }

        outcome
    }

    /// Record an error; returns true unless an identical one was active.
    pub fn raise(&mut self, error: AgvError) -> bool {
        let added = self.errors.raise(error);
        if !added {
            debug!("error already active");
        }
        added
    }

    pub fn clear_errors(&mut self, error_type: Option<&str>) -> usize {
        self.errors.clear(error_type)
    }

    pub fn has_fatal(&self) -> bool {
        self.errors.has_fatal()
    }

    pub fn errors(&self) -> &ErrorRegistry {
        &self.errors
    }

    pub fn battery(&self) -> &Battery {
        &self.battery
    }

    pub fn faults(&mut self) -> &mut FaultInjector {
        &mut self.faults
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: serde_json::Value) -> SimConfig {
        SimConfig::from_value(json).unwrap()
    }

    #[test]
    fn test_depletion_raises_fatal() {
        let mut health = HealthModel::new(
            &config(serde_json::json!({
                "battery": {"initial_charge": 1.0, "drain_driving_per_second": 1.0}
            })),
            0,
        );
        let driving = BatteryActivity {
            driving: true,
            ..Default::default()
        };

        health.step(0.5, driving);
        assert!(health.errors().contains("DEVICE_ERROR", BATTERY_LOW));
        assert!(!health.has_fatal());

        health.step(1.0, driving);
        assert!(health.has_fatal());
        assert!(health.errors().contains("DEVICE_ERROR", BATTERY_DEPLETED));
    }

    #[test]
    fn test_errors_never_auto_clear() {
        let mut health = HealthModel::new(&SimConfig::default(), 0);
        health.raise(error_record(ErrorKind::MotionError, ErrorLevel::Fatal, "blocked", &[]));

        for _ in 0..50 {
            health.step(0.1, BatteryActivity::default());
        }
        assert!(health.has_fatal());

        assert_eq!(health.clear_errors(None), 1);
        assert!(!health.has_fatal());
    }

    #[test]
    fn test_certain_random_fault() {
        let mut health = HealthModel::new(
            &config(serde_json::json!({
                "errors": {"probability_per_tick": 1.0, "level": "FATAL", "seed": 3}
            })),
            0,
        );
        health.step(0.1, BatteryActivity::default());

        assert!(health.has_fatal());
        assert_eq!(health.errors().errors().len(), 1);

        health.step(0.1, BatteryActivity::default());
        assert_eq!(health.errors().errors().len(), 1);
    }

    #[test]
    fn test_seeded_streams_repeat() {
        let cfg = config(serde_json::json!({
            "errors": {"probability_per_tick": 0.3, "seed": 11}
        }));
        let run = |index| {
            let mut health = HealthModel::new(&cfg, index);
            (0..30)
                .map(|_| {
                    health.step(0.1, BatteryActivity::default());
                    let n = health.errors().errors().len();
                    health.clear_errors(None);
                    n
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(0), run(0));
    }
}
