//! Actions: catalogue, planning and lifecycle tracking

mod executor;
mod kind;

pub use executor::{
    ActionEvent, ActionExecutor, ActionOrigin, ExecMode, TrackedAction, CANCELLED,
    INSTANT_ID_MEMORY, INSTANT_STATE_LIMIT,
};
pub use kind::{
    ActionContext, ActionEffect, ActionKind, ActionPlan, ActionTimings, Completion, PlanFn,
};
