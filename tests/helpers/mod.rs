#![allow(dead_code)]

use gitguard::security::{ConfirmationPolicy, Confirmer};
use gitguard::{Config, Plan};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Helper to create a test git repository on branch `main`
pub fn create_test_repo() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let repo_path = temp_dir.path().join("repo");
    fs::create_dir(&repo_path).unwrap();

    git(&repo_path, &["init", "--quiet"]);
    git(&repo_path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(&repo_path, &["config", "user.name", "Test User"]);
    git(&repo_path, &["config", "user.email", "test@example.com"]);
    git(&repo_path, &["config", "commit.gpgsign", "false"]);

    (temp_dir, repo_path)
}

/// Helper to create a commit
pub fn create_commit(repo_path: &Path, file: &str, content: &str, message: &str) {
    fs::write(repo_path.join(file), content).expect("Failed to write file");
    git(repo_path, &["add", file]);
    git(repo_path, &["commit", "--quiet", "-m", message]);
}

/// Run git in `repo_path`, panicking on failure, and return trimmed stdout
pub fn git(repo_path: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn head(repo_path: &Path) -> String {
    git(repo_path, &["rev-parse", "HEAD"])
}

pub fn read(repo_path: &Path, file: &str) -> Option<String> {
    fs::read_to_string(repo_path.join(file)).ok()
}

/// Config keeping every side file inside `dir`
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default_config();
    config.behavior.audit_log_path = Some(dir.join("audit").join("history.log"));
    config.ledger.fsync = false;
    config.git.timeout_seconds = Some(30);
    config
}

/// Confirmer replaying a fixed answer and counting prompts
pub struct Scripted {
    answer: Option<String>,
    pub prompts: Vec<ConfirmationPolicy>,
}

impl Scripted {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            prompts: Vec::new(),
        }
    }

    /// Behaves like a closed terminal
    pub fn silent() -> Self {
        Self {
            answer: None,
            prompts: Vec::new(),
        }
    }
}

impl Confirmer for Scripted {
    fn confirm(&mut self, _plan: &Plan, policy: ConfirmationPolicy) -> io::Result<Option<String>> {
        self.prompts.push(policy);
        Ok(self.answer.clone())
    }
}

/// Confirmer whose prompt always fails
pub struct Broken;

impl Confirmer for Broken {
    fn confirm(&mut self, _plan: &Plan, _policy: ConfirmationPolicy) -> io::Result<Option<String>> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal went away"))
    }
}
