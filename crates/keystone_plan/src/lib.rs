//! KEYSTONE Planner
//!
//! Drives a stack definition through validation, scheduling and policy
//! synthesis, emits the resulting plan as canonical JSON, and compares
//! emitted plans.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod diff;
pub mod emit;
pub mod error;
pub mod pipeline;
pub mod stack;

pub use config::PlannerConfig;
pub use diff::{
    DiffSummary, GrantChange, PlacedResource, PlanDiff, ResourceChange, ResourceGrantChange,
};
pub use emit::{Binding, EmittedPlan, PLAN_FORMAT, Plan, PlanEmitter, PlannedPhase, PlannedResource};
pub use error::{EmitError, EmitResult, PlanError, PlanResult, Stage};
pub use pipeline::{Planner, ResolvedStack};
pub use stack::StackDefinition;
