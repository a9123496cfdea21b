//! Fixed-period tick scheduling
//!
//! Deadlines advance by exactly one period from the previous deadline, not
//! from when the tick finished. A tick that overruns makes the next one
//! start late; no tick is ever dropped.

use std::time::{Duration, Instant};

use tracing::warn;

/// What to do before the next tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPlan {
    /// Time to sleep before running the tick
    pub sleep: Duration,
    /// How far past its deadline the tick will start
    pub late_by: Duration,
}

impl TickPlan {
    pub fn is_late(&self) -> bool {
        !self.late_by.is_zero()
    }
}

/// Deadline scheduler for one robot's tick loop
#[derive(Debug, Clone)]
pub struct TickScheduler {
    period: Duration,
    next_deadline: Instant,
    ticks: u64,
    late_ticks: u64,
}

impl TickScheduler {
    /// First tick is due immediately at `start`.
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            next_deadline: start,
            ticks: 0,
            late_ticks: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of ticks planned so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Number of ticks that started after their deadline
    pub fn late_ticks(&self) -> u64 {
        self.late_ticks
    }

    /// Plan the next tick at wall-clock `now` and advance the deadline.
    pub fn plan(&mut self, now: Instant) -> TickPlan {
        let deadline = self.next_deadline;
        self.next_deadline = deadline + self.period;
        self.ticks += 1;

        let plan = TickPlan {
            sleep: deadline.saturating_duration_since(now),
            late_by: now.saturating_duration_since(deadline),
        };
        if plan.is_late() {
            self.late_ticks += 1;
        }
        plan
    }

    /// Block until the next tick is due.
    pub fn wait(&mut self, robot: &str) -> TickPlan {
        let plan = self.plan(Instant::now());
        if plan.is_late() {
            // Sub-millisecond jitter is expected from thread wakeups.
            if plan.late_by >= Duration::from_millis(1) {
                warn!(
                    robot = %robot,
                    tick = self.ticks,
                    late_ms = plan.late_by.as_millis() as u64,
                    "tick started late"
                );
            }
        } else if !plan.sleep.is_zero() {
            std::thread::sleep(plan.sleep);
        }
        plan
    }
}
