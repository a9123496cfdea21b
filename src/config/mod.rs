//! Simulator configuration
//!
//! Implements the 3-layer configuration merge:
//! 1. Built-in simulator defaults
//! 2. Config file (TOML)
//! 3. CLI flags
//!
//! The merged document is deserialized into a typed [`SimConfig`].

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::{default_start_pose, BuiltinDefaults};
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{merge_layers, overlay};
pub use settings::{
    ActionSettings, BatterySettings, ErrorSettings, FleetSettings, MotionSettings, RobotSettings,
    RobotSpec, SimConfig, StartPose, TickSettings,
};
