use crate::error::{GitError, GitResult};
use crate::git::executor::GitExecutor;
use crate::git::parser::{self, RefEntry, StatusEntry};
use std::env;
use std::path::{Path, PathBuf};

/// Represents a git repository and provides read-only access to its state
#[derive(Debug, Clone)]
pub struct Repository {
    path: PathBuf,
    executor: GitExecutor,
}

impl Repository {
    /// Detect git repository from current working directory
    pub fn discover() -> GitResult<Self> {
        let current_dir = env::current_dir().map_err(GitError::IoError)?;

        Self::discover_from(&current_dir)
    }

    /// Detect git repository starting from a specific directory
    pub fn discover_from<P: AsRef<Path>>(start_path: P) -> GitResult<Self> {
        let mut current = start_path.as_ref().to_path_buf();

        loop {
            // `.git` may be a directory or, for linked worktrees, a file
            if current.join(".git").exists() {
                return Ok(Self::new(current));
            }

            // Move up to parent directory
            if !current.pop() {
                return Err(GitError::NotARepository);
            }
        }
    }

    /// Create a Repository for a known working tree root
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let executor = GitExecutor::new(&path);

        Self { path, executor }
    }

    /// Replace the executor used for queries (timeouts, scrubbed env)
    pub fn with_executor(mut self, executor: GitExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Get the repository path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absolute path of the repository's control directory
    pub fn git_dir(&self) -> GitResult<PathBuf> {
        let output = self
            .executor
            .execute("rev-parse --absolute-git-dir")
            .map_err(|e| self.classify(e))?;
        let dir = output.stdout.trim();
        if dir.is_empty() {
            return Err(GitError::ParseError("empty git dir".to_string()));
        }
        Ok(PathBuf::from(dir))
    }

    /// Where HEAD currently points
    pub fn current_ref(&self) -> GitResult<HeadRef> {
        let branch = self
            .executor
            .run(&["symbolic-ref", "--quiet", "--short", "HEAD"], &[])?;
        if !branch.success && branch.exit_code != 1 {
            return Err(self.classify(GitError::CommandFailed(branch.stderr.trim().to_string())));
        }

        let commit = self
            .executor
            .run(&["rev-parse", "--quiet", "--verify", "HEAD^{commit}"], &[])?;
        if !commit.success && commit.exit_code != 1 {
            return Err(self.classify(GitError::CommandFailed(commit.stderr.trim().to_string())));
        }

        Ok(HeadRef {
            branch: branch
                .success
                .then(|| branch.stdout.trim().to_string())
                .filter(|b| !b.is_empty()),
            commit: commit
                .success
                .then(|| commit.stdout.trim().to_string())
                .filter(|c| !c.is_empty()),
        })
    }

    /// True when the index or working tree differs from HEAD, or untracked files exist
    pub fn is_working_tree_dirty(&self) -> GitResult<bool> {
        Ok(!self.status()?.is_empty())
    }

    /// Check whether a fully qualified ref (e.g. `refs/heads/main`) exists
    pub fn ref_exists(&self, name: &str) -> GitResult<bool> {
        let output = self
            .executor
            .run(&["show-ref", "--verify", "--quiet", name], &[])?;
        match output.exit_code {
            0 => Ok(true),
            1 => Ok(false),
            _ => Err(self.classify(GitError::CommandFailed(output.stderr.trim().to_string()))),
        }
    }

    /// Check whether `rev` names an existing commit object
    pub fn commit_exists(&self, rev: &str) -> GitResult<bool> {
        let spec = format!("{}^{{commit}}", rev);
        let output = self.executor.run(&["cat-file", "-e", spec.as_str()], &[])?;
        Ok(output.success)
    }

    /// Get status entries
    pub fn status(&self) -> GitResult<Vec<StatusEntry>> {
        let output = self
            .executor
            .execute("status --porcelain=v2 --untracked-files=all")
            .map_err(|e| self.classify(e))?;
        parser::parse_status_porcelain_v2(&output.stdout)
    }

    /// List refs under a pattern such as `refs/heads/gitguard-backup-*`
    pub fn list_refs(&self, pattern: &str) -> GitResult<Vec<RefEntry>> {
        let output = self
            .executor
            .execute_args(&[
                "for-each-ref",
                "--format=%(refname)%00%(objectname)",
                pattern,
            ])
            .map_err(|e| self.classify(e))?;
        parser::parse_ref_list(&output.stdout)
    }

    /// Detect a merge, rebase, cherry-pick or revert left in progress
    pub fn in_progress_operation(&self) -> GitResult<Option<InProgressOperation>> {
        let git_dir = self.git_dir()?;

        let op = if git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists() {
            Some(InProgressOperation::Rebase)
        } else if git_dir.join("MERGE_HEAD").exists() {
            Some(InProgressOperation::Merge)
        } else if git_dir.join("CHERRY_PICK_HEAD").exists() {
            Some(InProgressOperation::CherryPick)
        } else if git_dir.join("REVERT_HEAD").exists() {
            Some(InProgressOperation::Revert)
        } else {
            None
        };

        Ok(op)
    }

    /// Get the git executor for this repository
    pub fn executor(&self) -> &GitExecutor {
        &self.executor
    }

    fn classify(&self, err: GitError) -> GitError {
        match err {
            GitError::CommandFailed(msg) if msg.to_lowercase().contains("not a git repository") => {
                GitError::NotARepository
            }
            other => other,
        }
    }
}

/// Where HEAD points: an attached branch (if any) and the commit (if any)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadRef {
    pub branch: Option<String>,
    pub commit: Option<String>,
}

impl HeadRef {
    /// Check if in detached HEAD state
    pub fn is_detached(&self) -> bool {
        self.branch.is_none() && self.commit.is_some()
    }

    /// Check if HEAD has no commit yet
    pub fn is_unborn(&self) -> bool {
        self.commit.is_none()
    }
}

/// Multi-step operations git can leave half-finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InProgressOperation {
    Merge,
    Rebase,
    CherryPick,
    Revert,
}
