use crate::audit::AuditLogger;
use crate::checkpoint::Checkpoint;
use crate::error::GitError;
use crate::git::executor::GitExecutor;
use crate::plan::model::{Plan, RiskLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest stderr excerpt kept in a record
const MAX_STDERR_EXCERPT: usize = 2000;

/// Exit code recorded when git never produced one (spawn failure, timeout, signal)
pub const NO_EXIT_CODE: i32 = -1;

/// Overall result of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    PartialFailure,
    AbortedByUser,
}

/// One command that was actually run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub command: String,
    pub exit_code: i32,
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Details of the command that stopped a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFailure {
    pub command: String,
    pub exit_code: i32,
    pub stderr: String,
    #[serde(default)]
    pub timed_out: bool,
}

/// What happened when a plan went through the safety layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub plan_summary: String,
    pub risk_level: RiskLevel,
    pub checkpoint_id: Option<String>,
    pub commands: Vec<CommandOutcome>,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<CommandFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionRecord {
    /// Record for a plan the user declined at the gate
    pub fn aborted(plan: &Plan) -> Self {
        let now = Utc::now();
        Self {
            plan_summary: plan.summary().to_string(),
            risk_level: plan.risk_level(),
            checkpoint_id: None,
            commands: Vec::new(),
            outcome: Outcome::AbortedByUser,
            failure: None,
            started_at: now,
            finished_at: now,
        }
    }
}

/// Runs plan commands against the real git binary
#[derive(Debug, Clone)]
pub struct PlanExecutor {
    git: GitExecutor,
    audit: Option<AuditLogger>,
}

impl PlanExecutor {
    pub fn new(git: GitExecutor) -> Self {
        Self { git, audit: None }
    }

    /// Write every executed command to the audit log
    pub fn with_audit(mut self, audit: Option<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    /// Run the plan's commands in order, stopping at the first failure
    ///
    /// Failures never surface as `Err`: they end the plan and land in the
    /// record, with the checkpoint as the recovery path.
    pub fn execute(&self, plan: &Plan, checkpoint: &Checkpoint) -> ExecutionRecord {
        let started_at = Utc::now();
        let mut commands = Vec::with_capacity(plan.commands().len());
        let mut failure = None;

        for planned in plan.commands() {
            tracing::info!(command = planned.text(), checkpoint = %checkpoint.id, "executing plan command");

            let (exit_code, stderr, timed_out) = match self.git.run(planned.args(), &[]) {
                Ok(output) => (output.exit_code, output.stderr, false),
                Err(GitError::Timeout { seconds, .. }) => (
                    NO_EXIT_CODE,
                    format!("timed out after {}s", seconds),
                    true,
                ),
                Err(e) => (NO_EXIT_CODE, e.to_string(), false),
            };

            self.audit_command(planned.text(), &checkpoint.id, exit_code);

            commands.push(CommandOutcome {
                command: planned.text().to_string(),
                exit_code,
            });

            if exit_code != 0 {
                tracing::warn!(command = planned.text(), exit_code, "plan command failed; stopping");
                failure = Some(CommandFailure {
                    command: planned.text().to_string(),
                    exit_code,
                    stderr: excerpt(&stderr),
                    timed_out,
                });
                break;
            }
        }

        ExecutionRecord {
            plan_summary: plan.summary().to_string(),
            risk_level: plan.risk_level(),
            checkpoint_id: Some(checkpoint.id.clone()),
            commands,
            outcome: if failure.is_some() {
                Outcome::PartialFailure
            } else {
                Outcome::Success
            },
            failure,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn audit_command(&self, command: &str, checkpoint_id: &str, exit_code: i32) {
        if let Some(audit) = &self.audit {
            if let Err(e) =
                audit.log_command(command, self.git.repo_path(), Some(checkpoint_id), exit_code)
            {
                tracing::warn!(error = %e, "failed to write audit log");
            }
        }
    }
}

fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= MAX_STDERR_EXCERPT {
        return trimmed.to_string();
    }
    let mut cut = trimmed.len() - MAX_STDERR_EXCERPT;
    while !trimmed.is_char_boundary(cut) {
        cut += 1;
    }
    format!("...{}", &trimmed[cut..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::{Path, PathBuf};
    use std::process::Command;
    use tempfile::TempDir;

    fn git(repo_path: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(repo_path)
            .output()
            .unwrap();
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn create_test_repo() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let repo_path = temp_dir.path().to_path_buf();

        git(&repo_path, &["init"]);
        git(&repo_path, &["config", "user.name", "Test User"]);
        git(&repo_path, &["config", "user.email", "test@example.com"]);
        std::fs::write(repo_path.join("a.txt"), "a").unwrap();
        git(&repo_path, &["add", "a.txt"]);
        git(&repo_path, &["commit", "-m", "initial"]);

        (temp_dir, repo_path)
    }

    fn checkpoint_stub() -> Checkpoint {
        Checkpoint {
            id: "gitguard-backup-20240101_000000".to_string(),
            reference: "refs/heads/gitguard-backup-20240101_000000".to_string(),
            commit: "0".repeat(40),
            branch: None,
            created_at: Utc::now(),
            snapshot: None,
        }
    }

    #[test]
    fn test_all_commands_succeed() {
        let (_temp, repo_path) = create_test_repo();
        let executor = PlanExecutor::new(GitExecutor::new(&repo_path));
        let plan = Plan::new("tag it", RiskLevel::Safe, ["git status", "git tag v1"]).unwrap();

        let record = executor.execute(&plan, &checkpoint_stub());

        assert_eq!(record.outcome, Outcome::Success);
        assert_eq!(record.commands.len(), 2);
        assert!(record.commands.iter().all(CommandOutcome::succeeded));
        assert!(record.failure.is_none());
        assert_eq!(git(&repo_path, &["tag", "--list", "v1"]), "v1");
    }

    #[test]
    fn test_stops_on_first_failure() {
        let (_temp, repo_path) = create_test_repo();
        let executor = PlanExecutor::new(GitExecutor::new(&repo_path));
        let plan = Plan::new(
            "three steps",
            RiskLevel::Medium,
            ["git tag first", "git checkout no-such-branch", "git tag third"],
        )
        .unwrap();

        let record = executor.execute(&plan, &checkpoint_stub());

        assert_eq!(record.outcome, Outcome::PartialFailure);
        assert_eq!(record.commands.len(), 2);
        assert!(record.commands[0].succeeded());
        assert!(!record.commands[1].succeeded());

        let failure = record.failure.unwrap();
        assert_eq!(failure.command, "git checkout no-such-branch");
        assert!(!failure.stderr.is_empty());
        assert!(!failure.timed_out);

        assert_eq!(git(&repo_path, &["tag", "--list", "third"]), "");
    }

    #[test]
    fn test_record_carries_checkpoint_id() {
        let (_temp, repo_path) = create_test_repo();
        let executor = PlanExecutor::new(GitExecutor::new(&repo_path));
        let plan = Plan::new("status", RiskLevel::Safe, ["git status"]).unwrap();

        let record = executor.execute(&plan, &checkpoint_stub());
        assert_eq!(
            record.checkpoint_id.as_deref(),
            Some("gitguard-backup-20240101_000000")
        );
    }

    #[test]
    fn test_excerpt_keeps_tail() {
        let long = format!("{}tail", "x".repeat(MAX_STDERR_EXCERPT * 2));
        let cut = excerpt(&long);
        assert!(cut.starts_with("..."));
        assert!(cut.ends_with("tail"));
        assert_eq!(cut.len(), MAX_STDERR_EXCERPT + 3);
    }

    #[test]
    fn test_record_json_shape() {
        let plan = Plan::new("s", RiskLevel::High, ["git status"]).unwrap();
        let json = serde_json::to_value(ExecutionRecord::aborted(&plan)).unwrap();

        assert_eq!(json["outcome"], "ABORTED_BY_USER");
        assert_eq!(json["risk_level"], "HIGH");
        assert!(json["checkpoint_id"].is_null());
    }
}
