pub mod executor;
pub mod model;

pub use executor::{CommandFailure, CommandOutcome, ExecutionRecord, Outcome, PlanExecutor};
pub use model::{Plan, PlanError, PlannedCommand, RawPlan, RiskLevel};
