//! Battery model
//!
//! Charge drains with driving time and running actions and recharges only
//! while a charging action runs at a charging station. Levels are percent.

use crate::config::BatterySettings;

/// What the robot did during one tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatteryActivity {
    pub driving: bool,
    /// Running actions other than charging
    pub running_actions: usize,
    /// A startCharging action is RUNNING at a charging station
    pub charging: bool,
}

/// Threshold crossings reported by [`Battery::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryEvent {
    /// Dropped below the low threshold
    Low,
    /// Reached zero
    Depleted,
    /// Charging reached the target level
    ChargeTargetReached,
}

#[derive(Debug, Clone)]
pub struct Battery {
    charge: f64,
    charging: bool,
    low_reported: bool,
    settings: BatterySettings,
}

impl Battery {
    pub fn new(settings: BatterySettings) -> Self {
        Self {
            charge: settings.initial_charge.clamp(0.0, 100.0),
            charging: false,
            low_reported: false,
            settings,
        }
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    /// Charging during the last step
    pub fn is_charging(&self) -> bool {
        self.charging
    }

    /// Advance the battery by `dt_seconds` of simulated time.
    pub fn step(&mut self, dt_seconds: f64, activity: BatteryActivity) -> Vec<BatteryEvent> {
        let mut events = Vec::new();
        let s = &self.settings;

        let mut drain = s.drain_action_per_second * activity.running_actions as f64;
        if activity.driving {
            drain += s.drain_driving_per_second;
        }
        let gain = if activity.charging {
            s.charge_per_second
        } else {
            0.0
        };

        self.charge = (self.charge + (gain - drain) * dt_seconds).clamp(0.0, 100.0);
        self.charging = activity.charging;

        if activity.charging && self.charge >= s.charge_target {
            events.push(BatteryEvent::ChargeTargetReached);
        }

        if self.charge < s.low_threshold {
            if !self.low_reported {
                self.low_reported = true;
                events.push(BatteryEvent::Low);
            }
        } else {
            self.low_reported = false;
        }

        if self.charge <= 0.0 {
            events.push(BatteryEvent::Depleted);
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BatterySettings {
        BatterySettings {
            initial_charge: 50.0,
            drain_driving_per_second: 1.0,
            drain_action_per_second: 0.5,
            charge_per_second: 10.0,
            charge_target: 80.0,
            low_threshold: 10.0,
            charging_stations: vec!["dock".to_string()],
        }
    }

    fn driving() -> BatteryActivity {
        BatteryActivity {
            driving: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_drain_while_driving() {
        let mut battery = Battery::new(settings());
        battery.step(2.0, driving());
        assert!((battery.charge() - 48.0).abs() < 1e-9);
    }

    #[test]
    fn test_idle_does_not_drain() {
        let mut battery = Battery::new(settings());
        battery.step(10.0, BatteryActivity::default());
        assert_eq!(battery.charge(), 50.0);
    }

    #[test]
    fn test_action_drain_scales_with_count() {
        let mut battery = Battery::new(settings());
        battery.step(
            1.0,
            BatteryActivity {
                running_actions: 2,
                ..Default::default()
            },
        );
        assert!((battery.charge() - 49.0).abs() < 1e-9);
    }

    #[test]
    fn test_monotonic_while_driving() {
        let mut battery = Battery::new(settings());
        let mut last = battery.charge();
        for _ in 0..100 {
            battery.step(0.1, driving());
            assert!(battery.charge() <= last);
            last = battery.charge();
        }
    }

    #[test]
    fn test_charging_reaches_target() {
        let mut battery = Battery::new(settings());
        let charging = BatteryActivity {
            charging: true,
            ..Default::default()
        };

        assert!(battery.step(1.0, charging).is_empty());
        assert!(battery.is_charging());
        assert_eq!(battery.step(2.0, charging), vec![BatteryEvent::ChargeTargetReached]);
        assert!((battery.charge() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_low_reported_once_then_depleted() {
        let mut s = settings();
        s.initial_charge = 11.0;
        let mut battery = Battery::new(s);

        assert_eq!(battery.step(2.0, driving()), vec![BatteryEvent::Low]);
        assert!(battery.step(1.0, driving()).is_empty());
        assert_eq!(battery.step(20.0, driving()), vec![BatteryEvent::Depleted]);
        assert_eq!(battery.charge(), 0.0);
    }

    #[test]
    fn test_clamped_at_full() {
        let mut s = settings();
        s.initial_charge = 99.0;
        s.charge_target = 100.0;
        let mut battery = Battery::new(s);
        battery.step(
            5.0,
            BatteryActivity {
                charging: true,
                ..Default::default()
            },
        );
        assert_eq!(battery.charge(), 100.0);
    }
}
