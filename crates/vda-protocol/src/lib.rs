//! VDA5050 Protocol Types
//!
//! Defines the JSON messages exchanged between a fleet management system
//! and a (simulated) AGV: orders and instant actions inbound, state and
//! visualization snapshots outbound.

pub mod action;
pub mod error;
pub mod header;
pub mod order;
pub mod state;
pub mod topic;

pub use action::{Action, ActionParameter, ActionStatus, BlockingType, InstantActions};
pub use error::{DecodeError, ErrorKind, ErrorLevel};
pub use header::Header;
pub use order::{Edge, Node, NodePosition, Order};
pub use state::{
    ActionState, AgvError, AgvPosition, BatteryState, EdgeState, ErrorReference,
    ExecutionState, Information, Load, NodeState, OperatingMode, SafetyState, State,
    Velocity, Visualization,
};
pub use topic::{decode_inbound, Channel, InboundMessage};

/// Protocol version string stamped into every outbound header.
pub const PROTOCOL_VERSION: &str = "2.0.0";

/// Default manufacturer name used when none is configured.
pub const DEFAULT_MANUFACTURER: &str = "DummyManufacturer";

/// Default topic interface prefix.
pub const DEFAULT_TOPIC_PREFIX: &str = "uagv";
