//! Order model & validator

mod graph;
mod validate;

pub use graph::ActiveOrder;
pub use validate::{check_structure, validate, MergePlan, RejectReason, RobotContext, Verdict};
