//! Motion simulator
//!
//! Moves a robot linearly from its current pose toward a target node at a
//! constant speed. Arrival snaps the pose exactly onto the node.

use vda_protocol::NodePosition;

use crate::config::MotionSettings;

/// Robot pose in the map frame (theta in radians)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    /// Euclidean distance to a point
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        (x - self.x).hypot(y - self.y)
    }
}

/// Node the robot is driving toward
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionTarget {
    pub x: f64,
    pub y: f64,
    /// Heading adopted on arrival, if the node specifies one
    pub theta: Option<f64>,
    /// Arrival tolerance in meters
    pub tolerance: f64,
}

impl MotionTarget {
    /// Target for a node position, using `default_tolerance` when the node
    /// has no positive `allowedDeviationXY`.
    pub fn from_node(position: &NodePosition, default_tolerance: f64) -> Self {
        Self {
            x: position.x,
            y: position.y,
            theta: position.theta,
            tolerance: allowed_deviation(position, default_tolerance),
        }
    }
}

/// Outcome of one motion step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionStep {
    /// Still on the edge after moving `distance`
    Moving { distance: f64 },
    /// Reached the target; `distance` includes the snap onto the node
    Arrived { distance: f64 },
}

impl MotionStep {
    pub fn distance(&self) -> f64 {
        match self {
            MotionStep::Moving { distance } | MotionStep::Arrived { distance } => *distance,
        }
    }

    pub fn arrived(&self) -> bool {
        matches!(self, MotionStep::Arrived { .. })
    }
}

/// Node arrival tolerance: the node's `allowedDeviationXY` when positive,
/// otherwise the configured default.
pub fn allowed_deviation(position: &NodePosition, default_tolerance: f64) -> f64 {
    position
        .allowed_deviation_xy
        .filter(|d| *d > 0.0)
        .unwrap_or(default_tolerance)
}

/// Speed on an edge: its `maxSpeed` (or the default) capped by the robot's
/// maximum speed.
pub fn effective_speed(edge_max_speed: Option<f64>, settings: &MotionSettings) -> f64 {
    edge_max_speed
        .unwrap_or(settings.default_speed)
        .min(settings.max_speed)
}

/// Advance `pose` toward `target` for `dt_seconds` at `speed`.
///
/// While moving, theta follows the direction of travel. On arrival the pose
/// is clamped onto the target and adopts the target's theta when present.
pub fn advance(pose: &mut Pose, target: &MotionTarget, speed: f64, dt_seconds: f64) -> MotionStep {
    let remaining = pose.distance_to(target.x, target.y);
    let step = (speed * dt_seconds).max(0.0);

    if step >= remaining || remaining - step <= target.tolerance {
        let heading = if remaining > f64::EPSILON {
            (target.y - pose.y).atan2(target.x - pose.x)
        } else {
            pose.theta
        };
        pose.x = target.x;
        pose.y = target.y;
        pose.theta = target.theta.unwrap_or(heading);
        return MotionStep::Arrived {
            distance: remaining,
        };
    }

    let heading = (target.y - pose.y).atan2(target.x - pose.x);
    pose.x += step * heading.cos();
    pose.y += step * heading.sin();
    pose.theta = heading;
    MotionStep::Moving { distance: step }
}
