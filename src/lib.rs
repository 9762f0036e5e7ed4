pub mod audit;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod git;
pub mod guard;
pub mod ledger;
pub mod plan;
pub mod security;

// Re-export commonly used types for convenience
pub use checkpoint::{Checkpoint, CheckpointError, CheckpointManager, RestoreResult};
pub use config::Config;
pub use error::{GitError, GitResult, GuardError, GuardResult};
pub use git::{GitVersion, HeadRef, Repository};
pub use guard::Guard;
pub use ledger::{LedgerEntry, SessionLedger};
pub use plan::{ExecutionRecord, Outcome, Plan, PlanError, RiskLevel};
pub use security::{ConfirmationPolicy, Confirmer, RiskGate};
