//! Bounds on tick cadence and action run time
//!
//! All timing is in simulated time: an action's budget is consumed by the
//! `dt` of the ticks it spends RUNNING, never by wall-clock time. An action
//! that exceeds `max_action_seconds` is failed by the executor.

use std::time::Duration;

/// Upper bound on any single action
pub const MAX_ACTION_SECONDS_LIMIT: u64 = 86_400;

/// Upper bound on the tick period
pub const MAX_TICK_PERIOD_MS: u64 = 60_000;

/// Timeout configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Maximum simulated time an action may stay RUNNING (default: 300)
    pub max_action_seconds: u64,

    /// Wall-clock tick period (default: 100)
    pub tick_period_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            max_action_seconds: 300,
            tick_period_ms: 100,
        }
    }
}

impl TimeoutConfig {
    /// Validate bounds
    pub fn validate(&self) -> Result<(), TimeoutValidationError> {
        if self.max_action_seconds == 0 || self.max_action_seconds > MAX_ACTION_SECONDS_LIMIT {
            return Err(TimeoutValidationError::ActionOutOfBounds {
                value: self.max_action_seconds,
            });
        }

        if self.tick_period_ms == 0 || self.tick_period_ms > MAX_TICK_PERIOD_MS {
            return Err(TimeoutValidationError::TickPeriodOutOfBounds {
                value: self.tick_period_ms,
            });
        }

        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    /// Per-action budget
    pub fn action_budget(&self) -> ActionTimeout {
        ActionTimeout::new(Duration::from_secs(self.max_action_seconds))
    }
}

/// Timeout validation errors
#[derive(Debug, thiserror::Error)]
pub enum TimeoutValidationError {
    #[error("actions.max_seconds must be in (0, 86400], got {value}")]
    ActionOutOfBounds { value: u64 },

    #[error("tick.period_ms must be in (0, 60000], got {value}")]
    TickPeriodOutOfBounds { value: u64 },
}

/// Timeout check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStatus {
    Ok,
    /// RUNNING longer than the budget
    Exceeded,
}

impl TimeoutStatus {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeoutStatus::Exceeded)
    }

    /// Result description recorded on the failed action
    pub fn result_description(&self) -> Option<&'static str> {
        match self {
            TimeoutStatus::Ok => None,
            TimeoutStatus::Exceeded => Some("timed out"),
        }
    }
}

/// Simulated-time budget for one action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionTimeout {
    limit: Duration,
}

impl ActionTimeout {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Check an action that has been RUNNING for `elapsed`.
    pub fn check(&self, elapsed: Duration) -> TimeoutStatus {
        if elapsed > self.limit {
            TimeoutStatus::Exceeded
        } else {
            TimeoutStatus::Ok
        }
    }

    /// Budget left before the action is failed
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.limit.saturating_sub(elapsed)
    }
}

impl Default for ActionTimeout {
    fn default() -> Self {
        TimeoutConfig::default().action_budget()
    }
}
