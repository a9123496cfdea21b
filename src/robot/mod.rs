//! Robot state machine
//!
//! One [`RobotMachine`] per simulated robot. Inputs are queued on the
//! robot's inbox and applied only at tick boundaries.

mod inbox;
mod instant;
mod machine;
mod phase;
mod snapshot;

pub use inbox::{partition, InboxMessage, RobotInput};
pub use instant::SIMULATED_ERROR;
pub use machine::{RobotMachine, TickOutput};
pub use phase::Phase;
pub use snapshot::HeaderCounters;
