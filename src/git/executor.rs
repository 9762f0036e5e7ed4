use crate::error::{GitError, GitResult};
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often a running git process is polled while a timeout is armed
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Result of executing a git command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
}

/// Executes git commands within a repository
#[derive(Debug, Clone)]
pub struct GitExecutor {
    repo_path: PathBuf,
    timeout: Option<Duration>,
    scrubbed_env: Vec<String>,
}

impl GitExecutor {
    /// Create a new GitExecutor for the given repository path
    pub fn new<P: AsRef<Path>>(repo_path: P) -> Self {
        Self {
            repo_path: repo_path.as_ref().to_path_buf(),
            timeout: None,
            scrubbed_env: Vec::new(),
        }
    }

    /// Kill any git process still running after `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Environment variables removed from every spawned git process
    pub fn with_scrubbed_env<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scrubbed_env = vars.into_iter().map(Into::into).collect();
        self
    }

    /// Execute a git command and return the output
    ///
    /// The command string should not include "git" prefix and is split on
    /// whitespace. Example: executor.execute("status --porcelain=v2")
    pub fn execute(&self, command: &str) -> GitResult<CommandOutput> {
        // Basic input sanitization - no shell interpolation
        if command.contains('$') || command.contains('`') {
            return Err(GitError::CommandFailed(
                "Command contains potentially unsafe characters".to_string(),
            ));
        }

        let args: Vec<&str> = command.split_whitespace().collect();
        if args.is_empty() {
            return Err(GitError::CommandFailed("Empty command".to_string()));
        }

        self.execute_args(&args)
    }

    /// Execute git with pre-split arguments, failing on non-zero exit
    pub fn execute_args<S: AsRef<OsStr>>(&self, args: &[S]) -> GitResult<CommandOutput> {
        self.execute_args_with_env(args, &[])
    }

    /// Execute git with pre-split arguments and extra environment, failing on non-zero exit
    pub fn execute_args_with_env<S: AsRef<OsStr>>(
        &self,
        args: &[S],
        envs: &[(&str, &OsStr)],
    ) -> GitResult<CommandOutput> {
        let output = self.run(args, envs)?;

        if !output.success {
            return Err(GitError::CommandFailed(format!(
                "Command 'git {}' failed with exit code {}: {}",
                display_args(args),
                output.exit_code,
                output.stderr.trim()
            )));
        }

        Ok(output)
    }

    /// Run git and return its output regardless of exit status
    ///
    /// Only spawn failures and timeouts are errors; a non-zero exit is
    /// reported through `CommandOutput::success`.
    pub fn run<S: AsRef<OsStr>>(
        &self,
        args: &[S],
        envs: &[(&str, &OsStr)],
    ) -> GitResult<CommandOutput> {
        let mut command = Command::new("git");
        command
            .args(args)
            .current_dir(&self.repo_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("GIT_TERMINAL_PROMPT", "0");

        for var in &self.scrubbed_env {
            command.env_remove(var);
        }
        for (key, value) in envs {
            command.env(key, value);
        }

        tracing::debug!(args = %display_args(args), "running git");

        let mut child = command
            .spawn()
            .map_err(|e| GitError::CommandFailed(format!("Failed to execute git: {}", e)))?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match self.timeout {
            None => child.wait()?,
            Some(limit) => {
                let started = Instant::now();
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if started.elapsed() >= limit {
                        // Readers are left detached: grandchildren may still hold the pipes.
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(GitError::Timeout {
                            command: display_args(args),
                            seconds: limit.as_secs(),
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        };

        Ok(CommandOutput {
            stdout: collect(stdout),
            stderr: collect(stderr),
            exit_code: status.code().unwrap_or(-1),
            success: status.success(),
        })
    }

    /// Get the repository path
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Configured per-command timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    let bytes = handle
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default();
    String::from_utf8_lossy(&bytes).to_string()
}

fn display_args<S: AsRef<OsStr>>(args: &[S]) -> String {
    args.iter()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
