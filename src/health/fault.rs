//! Fault injection for action starts
//!
//! Failures can be forced per action type or action id (test hook) or drawn
//! at random with a configured probability per start.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vda_protocol::Action;

/// Description recorded on randomly failed actions
pub const RANDOM_FAILURE: &str = "simulated failure";

/// Forced failure for an action type or action id
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// Result description of the failed action
    pub description: String,
    /// Number of starts to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FaultConfig {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            fail_count: None,
        }
    }

    /// Set the number of starts to fail before succeeding
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

/// Decides whether a starting action fails
#[derive(Debug)]
pub struct FaultInjector {
    /// Forced failures keyed by action id or action type
    forced: HashMap<String, FaultConfig>,
    /// Start counts per key (for fail_count tracking)
    counts: HashMap<String, u32>,
    probability: f64,
    rng: StdRng,
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::new(0.0, Some(0))
    }
}

impl FaultInjector {
    /// Injector with a random failure `probability` per start; entropy-seeded
    /// when `seed` is None.
    pub fn new(probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            forced: HashMap::new(),
            counts: HashMap::new(),
            probability: probability.clamp(0.0, 1.0),
            rng,
        }
    }

    /// Force failures for an action id or action type
    pub fn inject(&mut self, key: impl Into<String>, config: FaultConfig) {
        let key = key.into();
        self.counts.insert(key.clone(), 0);
        self.forced.insert(key, config);
    }

    /// Always fail actions matching `key`
    pub fn inject_error(&mut self, key: impl Into<String>, description: impl Into<String>) {
        self.inject(key, FaultConfig::new(description));
    }

    pub fn clear(&mut self) {
        self.forced.clear();
        self.counts.clear();
    }

    /// Check whether `action` fails on start.
    ///
    /// Returns the failure description if it does. A forced failure by
    /// action id takes precedence over one by action type.
    pub fn check(&mut self, action: &Action) -> Option<String> {
        for key in [&action.action_id, &action.action_type] {
            if let Some(config) = self.forced.get(key) {
                let count = self.counts.entry(key.clone()).or_insert(0);
                *count += 1;

                match config.fail_count {
                    Some(limit) if *count > limit => {}
                    _ => return Some(config.description.clone()),
                }
            }
        }

        if self.probability > 0.0 && self.rng.gen::<f64>() < self.probability {
            return Some(RANDOM_FAILURE.to_string());
        }

        None
    }
}
