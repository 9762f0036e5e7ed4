use std::io;
use thiserror::Error;

// Import module-level errors for GuardError
use crate::checkpoint::manager::CheckpointError;
use crate::config::settings::ConfigError;
use crate::ledger::lock::LockError;
use crate::ledger::session::LedgerError;
use crate::plan::model::PlanError;

/// Errors that can occur during git operations
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Not a git repository")]
    NotARepository,

    #[error("Git command failed: {0}")]
    CommandFailed(String),

    #[error("Git command 'git {command}' timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("Failed to parse git output: {0}")]
    ParseError(String),

    #[error("Git version {0} is too old. Minimum required: 2.20")]
    GitVersionTooOld(String),

    #[error("Failed to detect git version: {0}")]
    GitVersionDetectionFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Top-level error for the safety layer
///
/// Every module error converts into `GuardError` via `From`, so orchestration
/// code can use `?` throughout while callers still match on the specific
/// failure class (repository state, plan rejection, checkpoint, lock, ...).
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Repository state error: {0}")]
    RepositoryState(#[from] GitError),

    #[error("Plan rejected: {0}")]
    Plan(#[from] PlanError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Repository lock unavailable: {0}")]
    ConcurrentOperation(#[from] LockError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Nothing to roll back: no checkpoint has been recorded for this repository")]
    NothingToRollBack,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for git operations
pub type GitResult<T> = std::result::Result<T, GitError>;

/// Result type for safety-layer operations
pub type GuardResult<T> = std::result::Result<T, GuardError>;
