use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Plain-text trail of every command gitguard ran, one line per command
#[derive(Debug, Clone)]
pub struct AuditLogger {
    log_path: PathBuf,
}

impl AuditLogger {
    /// Logger writing to ~/.config/gitguard/history.log
    pub fn new() -> io::Result<Self> {
        Self::with_path(Self::default_log_path()?)
    }

    pub fn with_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let log_path = path.as_ref().to_path_buf();

        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(Self { log_path })
    }

    fn default_log_path() -> io::Result<PathBuf> {
        let home = std::env::var("HOME").map_err(|_| {
            io::Error::new(io::ErrorKind::NotFound, "HOME environment variable not set")
        })?;

        Ok(PathBuf::from(home)
            .join(".config")
            .join("gitguard")
            .join("history.log"))
    }

    /// Record one executed plan command and the checkpoint guarding it
    pub fn log_command(
        &self,
        command: &str,
        repo_path: &Path,
        checkpoint_id: Option<&str>,
        exit_code: i32,
    ) -> io::Result<()> {
        let entry = format!(
            "[{}] [{}] [{}] [checkpoint:{}] [exit:{}] {}\n",
            Utc::now().to_rfc3339(),
            current_user(),
            repo_path.display(),
            checkpoint_id.unwrap_or("-"),
            exit_code,
            command
        );
        self.append(&entry)
    }

    /// Record a plan that never reached execution because it failed validation
    pub fn log_plan_rejected(&self, plan_text: &str, reason: &str, repo_path: &Path) -> io::Result<()> {
        let entry = format!(
            "[{}] [{}] [{}] [PLAN-REJECTED] plan=\"{}\" reason=\"{}\"\n",
            Utc::now().to_rfc3339(),
            current_user(),
            repo_path.display(),
            single_line(plan_text),
            single_line(reason)
        );
        self.append(&entry)
    }

    fn append(&self, entry: &str) -> io::Result<()> {
        self.rotate_if_needed()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;

        file.write_all(entry.as_bytes())?;
        file.flush()
    }

    /// Rotate: history.log -> history.log.1
    fn rotate_if_needed(&self) -> io::Result<()> {
        match fs::metadata(&self.log_path) {
            Ok(metadata) if metadata.len() > MAX_LOG_SIZE => {
                fs::rename(&self.log_path, self.log_path.with_extension("log.1"))
            }
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

fn current_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}

// Plans arrive as multi-line JSON; keep each audit entry on one line
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
