use crate::audit::AuditLogger;
use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointManager, RestoreResult, branch_ref};
use crate::config::Config;
use crate::error::{GuardError, GuardResult};
use crate::git::{GitExecutor, Repository};
use crate::ledger::{CONTROL_DIR, LedgerEntry, RepoLock, SessionLedger};
use crate::plan::{ExecutionRecord, Plan, PlanExecutor};
use crate::security::{Confirmer, GateDecision, RiskGate};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Entry point of the safety layer for one repository
///
/// Every mutating operation holds the repository lock for its whole
/// duration, so two gitguard processes never interleave checkpoints,
/// executions or restores.
#[derive(Debug)]
pub struct Guard {
    repo: Repository,
    control_dir: PathBuf,
    checkpoints: CheckpointManager,
    ledger: SessionLedger,
    gate: RiskGate,
    executor: PlanExecutor,
    audit: Option<AuditLogger>,
}

impl Guard {
    /// Wire up the guard for `repo` using `config`
    pub fn open(repo: Repository, config: &Config) -> GuardResult<Self> {
        config.validate()?;

        let git = GitExecutor::new(repo.path())
            .with_timeout(config.git.timeout())
            .with_scrubbed_env(config.git.scrubbed_env.iter().cloned());
        let repo = repo.with_executor(git.clone());

        let control_dir = repo.git_dir()?.join(CONTROL_DIR);
        let ledger = SessionLedger::open(&control_dir)?.with_fsync(config.ledger.fsync);

        let audit = if config.behavior.log_commands {
            let logger = match &config.behavior.audit_log_path {
                Some(path) => AuditLogger::with_path(path),
                None => AuditLogger::new(),
            };
            match logger {
                Ok(logger) => Some(logger),
                Err(e) => {
                    tracing::warn!(error = %e, "audit log unavailable; continuing without it");
                    None
                }
            }
        } else {
            None
        };

        tracing::debug!(
            repo = %repo.path().display(),
            ledger = %ledger.path().display(),
            "guard opened"
        );

        Ok(Self {
            checkpoints: CheckpointManager::new(repo.clone()),
            executor: PlanExecutor::new(git).with_audit(audit.clone()),
            gate: RiskGate::new().with_medium_confirmation(config.behavior.confirm_medium_risk),
            repo,
            control_dir,
            ledger,
            audit,
        })
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    /// `<git-dir>/gitguard`, home of the ledger and the lock
    pub fn control_dir(&self) -> &Path {
        &self.control_dir
    }

    fn lock(&self) -> GuardResult<RepoLock> {
        Ok(RepoLock::acquire(&self.control_dir)?)
    }

    /// Parse an inbound plan, recording rejections in the audit log
    pub fn parse_plan(&self, json: &str) -> GuardResult<Plan> {
        Plan::from_json(json).map_err(|e| {
            if let Some(audit) = &self.audit {
                if let Err(log_err) = audit.log_plan_rejected(json, &e.to_string(), self.repo.path()) {
                    tracing::warn!(error = %log_err, "failed to write audit log");
                }
            }
            e.into()
        })
    }

    /// Gate, checkpoint, execute and record one plan
    ///
    /// A denied plan is recorded as aborted and touches nothing else. Once the
    /// checkpoint exists, command failures end up in the returned record
    /// rather than as an error; nothing is reverted automatically.
    pub fn run(&self, plan: &Plan, confirmer: &mut dyn Confirmer) -> GuardResult<ExecutionRecord> {
        let _lock = self.lock()?;

        if self.gate.check(plan, confirmer) == GateDecision::Denied {
            let record = ExecutionRecord::aborted(plan);
            self.ledger.append(&LedgerEntry::from(record.clone()))?;
            return Ok(record);
        }

        let checkpoint = self.checkpoints.create_checkpoint()?;
        self.ledger.append(&LedgerEntry::from(checkpoint.clone()))?;

        let record = self.executor.execute(plan, &checkpoint);
        self.ledger.append(&LedgerEntry::from(record.clone()))?;

        tracing::info!(
            checkpoint = %checkpoint.id,
            outcome = ?record.outcome,
            commands = record.commands.len(),
            "plan finished"
        );
        Ok(record)
    }

    /// Restore the checkpoint taken most recently, by ledger order
    pub fn rollback(&self) -> GuardResult<RestoreResult> {
        let _lock = self.lock()?;

        let checkpoint = self
            .ledger
            .most_recent_checkpoint()?
            .ok_or(GuardError::NothingToRollBack)?;
        self.restore_locked(&checkpoint)
    }

    /// The checkpoint `rollback` would restore, if any
    pub fn rollback_target(&self) -> GuardResult<Option<Checkpoint>> {
        Ok(self.ledger.most_recent_checkpoint()?)
    }

    /// Restore a specific checkpoint
    ///
    /// Ledger metadata is preferred since it knows the branch HEAD was on;
    /// a checkpoint only present as refs restores to a detached HEAD.
    pub fn restore(&self, id: &str) -> GuardResult<RestoreResult> {
        let _lock = self.lock()?;

        let checkpoint = match self.ledger.checkpoint(id)? {
            Some(checkpoint) => checkpoint,
            None => self
                .checkpoints
                .find(id)?
                .ok_or_else(|| CheckpointError::NotFound {
                    id: id.to_string(),
                    reason: format!("not in the ledger and no ref {}", branch_ref(id)),
                })?,
        };
        self.restore_locked(&checkpoint)
    }

    fn restore_locked(&self, checkpoint: &Checkpoint) -> GuardResult<RestoreResult> {
        let result = self.checkpoints.restore_checkpoint(checkpoint)?;
        self.ledger.append(&LedgerEntry::from(result.clone()))?;
        Ok(result)
    }

    /// Take a checkpoint outside of any plan
    pub fn checkpoint(&self) -> GuardResult<Checkpoint> {
        let _lock = self.lock()?;

        let checkpoint = self.checkpoints.create_checkpoint()?;
        self.ledger.append(&LedgerEntry::from(checkpoint.clone()))?;
        Ok(checkpoint)
    }

    /// Checkpoints present as refs, most recent first, enriched with ledger metadata
    pub fn list_checkpoints(&self) -> GuardResult<Vec<Checkpoint>> {
        let from_refs = self.checkpoints.list_checkpoints()?;

        let recorded: HashMap<String, Checkpoint> = match self.ledger.checkpoints() {
            Ok(recorded) => recorded.into_iter().map(|c| (c.id.clone(), c)).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "ledger unreadable; listing checkpoints from refs only");
                HashMap::new()
            }
        };

        Ok(from_refs
            .into_iter()
            .map(|checkpoint| match recorded.get(&checkpoint.id) {
                Some(known) if known.commit == checkpoint.commit => known.clone(),
                _ => checkpoint,
            })
            .collect())
    }

    /// Execution records, most recent first
    pub fn history(&self) -> GuardResult<Vec<ExecutionRecord>> {
        Ok(self.ledger.history()?)
    }
}
