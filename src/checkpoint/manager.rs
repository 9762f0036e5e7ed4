use crate::checkpoint::{
    BRANCH_NAMESPACE, CHECKPOINT_PREFIX, Checkpoint, SNAPSHOT_NAMESPACE, WorkingTreeSnapshot,
    branch_ref, format_id, parse_id, snapshot_ref,
};
use crate::error::GitError;
use crate::git::executor::GitExecutor;
use crate::git::repository::{InProgressOperation, Repository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use thiserror::Error;

/// Give up looking for a free id after this many same-second collisions
const MAX_ID_SEQUENCE: u32 = 1000;

/// Identity used for snapshot commits, so capture works without user.name/user.email
const SNAPSHOT_IDENTITY: [(&str, &str); 4] = [
    ("GIT_AUTHOR_NAME", "gitguard"),
    ("GIT_AUTHOR_EMAIL", "gitguard@localhost"),
    ("GIT_COMMITTER_NAME", "gitguard"),
    ("GIT_COMMITTER_EMAIL", "gitguard@localhost"),
];

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Repository state error: {0}")]
    Repository(#[source] GitError),

    #[error("Failed to create checkpoint: {0}")]
    Creation(String),

    #[error("Checkpoint not found: {id} ({reason})")]
    NotFound { id: String, reason: String },

    #[error("Failed to restore checkpoint {id}: {source}")]
    Restore {
        id: String,
        #[source]
        source: GitError,
    },
}

/// What a restore changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreResult {
    pub checkpoint_id: String,
    pub previous_head: Option<String>,
    pub previous_branch: Option<String>,
    pub head: String,
    pub branch: Option<String>,
    pub head_moved: bool,
    /// Paths whose working tree content differs before vs. after the restore
    pub files_touched: Vec<String>,
    pub snapshot_reapplied: bool,
    pub restored_at: DateTime<Utc>,
}

/// Creates, lists and restores checkpoints
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    repo: Repository,
}

impl CheckpointManager {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    fn git(&self) -> &GitExecutor {
        self.repo.executor()
    }

    /// Snapshot HEAD and any uncommitted work under a fresh id
    ///
    /// Only new refs are written; HEAD, existing branches, the index and the
    /// working tree are left untouched.
    pub fn create_checkpoint(&self) -> Result<Checkpoint, CheckpointError> {
        self.create_checkpoint_at(Utc::now())
    }

    fn create_checkpoint_at(&self, created_at: DateTime<Utc>) -> Result<Checkpoint, CheckpointError> {
        let head = self.repo.current_ref().map_err(CheckpointError::Repository)?;
        let commit = head.commit.clone().ok_or_else(|| {
            CheckpointError::Creation("HEAD has no commits yet; nothing to restore to".to_string())
        })?;
        let dirty = self
            .repo
            .is_working_tree_dirty()
            .map_err(CheckpointError::Repository)?;

        let id = self.allocate_id(created_at)?;
        let reference = branch_ref(&id);

        let snapshot = if dirty {
            let snapshot = self
                .capture_working_tree(&id, &commit)
                .map_err(|e| CheckpointError::Creation(format!("capturing uncommitted changes: {}", e)))?;
            Some(snapshot)
        } else {
            None
        };

        if let Err(e) = self.create_ref(&reference, &commit) {
            if let Some(snapshot) = &snapshot {
                let _ = self.git().run(&["update-ref", "-d", snapshot.reference.as_str()], &[]);
            }
            return Err(CheckpointError::Creation(e.to_string()));
        }

        tracing::info!(id = %id, commit = %commit, dirty, "checkpoint created");

        Ok(Checkpoint {
            id,
            reference,
            commit,
            branch: head.branch,
            created_at,
            snapshot,
        })
    }

    /// First id for this second that no branch or snapshot ref uses yet
    fn allocate_id(&self, at: DateTime<Utc>) -> Result<String, CheckpointError> {
        for seq in 0..MAX_ID_SEQUENCE {
            let id = format_id(at, seq);
            let taken = |reference: String| {
                self.repo
                    .ref_exists(&reference)
                    .map_err(CheckpointError::Repository)
            };
            if !taken(branch_ref(&id))? && !taken(snapshot_ref(&id))? {
                return Ok(id);
            }
        }

        Err(CheckpointError::Creation(format!(
            "no free checkpoint id for {}",
            format_id(at, 0)
        )))
    }

    fn capture_working_tree(&self, id: &str, head: &str) -> Result<WorkingTreeSnapshot, GitError> {
        let (index_tree, flattened_conflicts) = self.index_tree()?;
        let index_commit =
            self.commit_tree(&index_tree, &[head], &format!("gitguard: index at {}", id))?;

        let worktree_tree = self.working_tree_tree()?;
        let commit = self.commit_tree(
            &worktree_tree,
            &[head, index_commit.as_str()],
            &format!("gitguard: working tree at {}", id),
        )?;

        let reference = snapshot_ref(id);
        self.create_ref(&reference, &commit)?;

        Ok(WorkingTreeSnapshot {
            reference,
            commit,
            flattened_conflicts,
        })
    }

    /// Tree for the current index, plus any unmerged paths that had to be flattened
    ///
    /// `write-tree` refuses an index with conflict stages, so during a
    /// conflicted merge, rebase or cherry-pick those paths are staged from
    /// the working tree in a scratch index. Other staged entries are kept.
    fn index_tree(&self) -> Result<(String, Vec<String>), GitError> {
        let unmerged = self.unmerged_paths()?;
        if unmerged.is_empty() {
            let tree = self.git().execute("write-tree")?;
            return Ok((tree.stdout.trim().to_string(), unmerged));
        }

        tracing::warn!(
            paths = ?unmerged,
            "index has unmerged paths; capturing their working tree content"
        );
        let mut add_args = vec!["--all", "--"];
        add_args.extend(unmerged.iter().map(String::as_str));
        let tree = self.scratch_index_tree(&add_args)?;

        Ok((tree, unmerged))
    }

    fn unmerged_paths(&self) -> Result<Vec<String>, GitError> {
        let output = self.git().execute_args(&["ls-files", "--unmerged", "-z"])?;
        // <mode> <object> <stage>\t<path>
        let mut paths: Vec<String> = output
            .stdout
            .split('\0')
            .filter_map(|entry| entry.split_once('\t').map(|(_, path)| path.to_string()))
            .collect();
        paths.dedup();
        Ok(paths)
    }

    /// Tree object for the whole working tree, untracked files included
    fn working_tree_tree(&self) -> Result<String, GitError> {
        self.scratch_index_tree(&["--all"])
    }

    /// Run `git add <add_args>` against a throwaway copy of the index and write its tree
    ///
    /// The real index is never written.
    fn scratch_index_tree(&self, add_args: &[&str]) -> Result<String, GitError> {
        let git_dir = self.repo.git_dir()?;
        let scratch = tempfile::Builder::new()
            .prefix("gitguard-index-")
            .tempdir_in(&git_dir)?;
        let index = scratch.path().join("index");

        let live_index = git_dir.join("index");
        if live_index.exists() {
            fs::copy(&live_index, &index)?;
        }

        let env = [("GIT_INDEX_FILE", index.as_os_str())];
        let mut args = vec!["add"];
        args.extend_from_slice(add_args);
        self.git().execute_args_with_env(&args, &env)?;
        let tree = self.git().execute_args_with_env(&["write-tree"], &env)?;

        Ok(tree.stdout.trim().to_string())
    }

    fn commit_tree(&self, tree: &str, parents: &[&str], message: &str) -> Result<String, GitError> {
        let mut args = vec!["commit-tree", "--no-gpg-sign", tree];
        for parent in parents {
            args.push("-p");
            args.push(*parent);
        }
        args.push("-m");
        args.push(message);

        let env: Vec<(&str, &OsStr)> = SNAPSHOT_IDENTITY
            .iter()
            .map(|(k, v)| (*k, OsStr::new(*v)))
            .collect();
        let output = self.git().execute_args_with_env(&args, &env)?;

        Ok(output.stdout.trim().to_string())
    }

    /// Create `name`; fails if it already exists
    fn create_ref(&self, name: &str, target: &str) -> Result<(), GitError> {
        self.git()
            .execute_args(&["update-ref", "-m", "gitguard checkpoint", name, target, ""])?;
        Ok(())
    }

    /// All checkpoints, most recent first, rebuilt from refs alone
    ///
    /// Branch names are not recorded in refs, so `branch` is always `None`
    /// here; callers with ledger metadata can fill it in.
    pub fn list_checkpoints(&self) -> Result<Vec<Checkpoint>, CheckpointError> {
        let pattern = |namespace: &str| format!("{}{}*", namespace, CHECKPOINT_PREFIX);

        let snapshots: HashMap<String, String> = self
            .repo
            .list_refs(&pattern(SNAPSHOT_NAMESPACE))
            .map_err(CheckpointError::Repository)?
            .into_iter()
            .filter_map(|r| {
                let id = r.name.strip_prefix(SNAPSHOT_NAMESPACE)?.to_string();
                Some((id, r.target))
            })
            .collect();

        let mut checkpoints: Vec<Checkpoint> = self
            .repo
            .list_refs(&pattern(BRANCH_NAMESPACE))
            .map_err(CheckpointError::Repository)?
            .into_iter()
            .filter_map(|r| {
                let id = r.name.strip_prefix(BRANCH_NAMESPACE)?.to_string();
                let Some((created_at, _)) = parse_id(&id) else {
                    tracing::debug!(reference = %r.name, "ignoring ref with checkpoint prefix but no timestamp");
                    return None;
                };
                let snapshot = snapshots.get(&id).map(|commit| WorkingTreeSnapshot {
                    reference: snapshot_ref(&id),
                    commit: commit.clone(),
                    flattened_conflicts: Vec::new(),
                });
                Some(Checkpoint {
                    id,
                    reference: r.name,
                    commit: r.target,
                    branch: None,
                    created_at,
                    snapshot,
                })
            })
            .collect();

        checkpoints.sort_by(|a, b| b.cmp_creation(a));
        Ok(checkpoints)
    }

    /// Look a checkpoint up by id from refs
    pub fn find(&self, id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.list_checkpoints()?.into_iter().find(|c| c.id == id))
    }

    /// Restore a checkpoint known only by id
    pub fn restore_by_id(&self, id: &str) -> Result<RestoreResult, CheckpointError> {
        let checkpoint = self.find(id)?.ok_or_else(|| CheckpointError::NotFound {
            id: id.to_string(),
            reason: format!("no ref {}", branch_ref(id)),
        })?;
        self.restore_checkpoint(&checkpoint)
    }

    /// Put HEAD, the index and the working tree back to the checkpoint's captured state
    ///
    /// Only the checkpoint's own refs and objects are consulted, so branches,
    /// tags or stashes changed since then do not affect the result. Restoring
    /// the same checkpoint twice yields the same state.
    pub fn restore_checkpoint(&self, checkpoint: &Checkpoint) -> Result<RestoreResult, CheckpointError> {
        self.verify_intact(checkpoint)?;

        let restore_err = |source: GitError| CheckpointError::Restore {
            id: checkpoint.id.clone(),
            source,
        };

        let before = self.repo.current_ref().map_err(CheckpointError::Repository)?;
        let before_tree = self.working_tree_tree().map_err(restore_err)?;

        self.clear_in_progress_operation().map_err(restore_err)?;

        let checkout = match &checkpoint.branch {
            Some(branch) => self.git().execute_args(&[
                "checkout",
                "--quiet",
                "--force",
                "-B",
                branch.as_str(),
                checkpoint.commit.as_str(),
            ]),
            None => self.git().execute_args(&[
                "checkout",
                "--quiet",
                "--force",
                "--detach",
                checkpoint.commit.as_str(),
            ]),
        };
        checkout.map_err(restore_err)?;

        if let Some(snapshot) = &checkpoint.snapshot {
            let worktree = format!("{}^{{tree}}", snapshot.commit);
            let index = format!("{}^2^{{tree}}", snapshot.commit);
            self.git()
                .execute_args(&["read-tree", "--reset", "-u", worktree.as_str()])
                .map_err(restore_err)?;
            self.git()
                .execute_args(&["read-tree", "--reset", index.as_str()])
                .map_err(restore_err)?;
            // Stat info is stale after read-tree without -u
            let _ = self.git().run(&["update-index", "-q", "--refresh"], &[]);
        }

        let after_tree = self.working_tree_tree().map_err(restore_err)?;
        let files_touched = self.changed_paths(&before_tree, &after_tree).map_err(restore_err)?;

        tracing::info!(
            id = %checkpoint.id,
            files = files_touched.len(),
            "checkpoint restored"
        );

        Ok(RestoreResult {
            checkpoint_id: checkpoint.id.clone(),
            head_moved: before.commit.as_deref() != Some(checkpoint.commit.as_str()),
            previous_head: before.commit,
            previous_branch: before.branch,
            head: checkpoint.commit.clone(),
            branch: checkpoint.branch.clone(),
            files_touched,
            snapshot_reapplied: checkpoint.snapshot.is_some(),
            restored_at: Utc::now(),
        })
    }

    fn verify_intact(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let missing = |reason: String| CheckpointError::NotFound {
            id: checkpoint.id.clone(),
            reason,
        };

        let check = |reference: &str, commit: &str| -> Result<Option<String>, CheckpointError> {
            if !self.repo.ref_exists(reference).map_err(CheckpointError::Repository)? {
                return Ok(Some(format!("ref {} is gone", reference)));
            }
            if !self.repo.commit_exists(commit).map_err(CheckpointError::Repository)? {
                return Ok(Some(format!("commit {} is gone", commit)));
            }
            Ok(None)
        };

        if let Some(reason) = check(&checkpoint.reference, &checkpoint.commit)? {
            return Err(missing(reason));
        }
        if let Some(snapshot) = &checkpoint.snapshot {
            if let Some(reason) = check(&snapshot.reference, &snapshot.commit)? {
                return Err(missing(reason));
            }
        }

        Ok(())
    }

    /// Abandon a half-finished merge, rebase, cherry-pick or revert
    fn clear_in_progress_operation(&self) -> Result<(), GitError> {
        let Some(op) = self.repo.in_progress_operation()? else {
            return Ok(());
        };
        tracing::info!(?op, "abandoning in-progress operation before restore");

        match op {
            InProgressOperation::Rebase => {
                let aborted = self.git().run(&["rebase", "--abort"], &[])?;
                if !aborted.success {
                    self.git().execute_args(&["rebase", "--quit"])?;
                }
            }
            InProgressOperation::Merge => {
                self.git().execute_args(&["reset", "--hard", "--quiet"])?;
            }
            InProgressOperation::CherryPick => {
                let _ = self.git().run(&["cherry-pick", "--quit"], &[]);
                self.git().execute_args(&["reset", "--hard", "--quiet"])?;
            }
            InProgressOperation::Revert => {
                let _ = self.git().run(&["revert", "--quit"], &[]);
                self.git().execute_args(&["reset", "--hard", "--quiet"])?;
            }
        }

        Ok(())
    }

    fn changed_paths(&self, before: &str, after: &str) -> Result<Vec<String>, GitError> {
        if before == after {
            return Ok(Vec::new());
        }
        let output = self
            .git()
            .execute_args(&["diff-tree", "-r", "-z", "--name-only", before, after])?;
        let mut paths: Vec<String> = output
            .stdout
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }
}
