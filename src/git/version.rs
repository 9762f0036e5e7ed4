use crate::error::{GitError, GitResult};
use std::fmt;
use std::process::Command;

/// Oldest git that supports everything checkpoints rely on
/// (`rev-parse --absolute-git-dir`, `rebase --quit`, `for-each-ref` globs).
pub const MIN_GIT_VERSION: GitVersion = GitVersion {
    major: 2,
    minor: 20,
    patch: 0,
};

/// Installed git version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GitVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl GitVersion {
    /// Ask the git binary on PATH for its version
    pub fn detect() -> GitResult<Self> {
        let output = Command::new("git")
            .arg("--version")
            .output()
            .map_err(|e| GitError::GitVersionDetectionFailed(format!("Failed to execute git: {}", e)))?;

        if !output.status.success() {
            return Err(GitError::GitVersionDetectionFailed(
                "git --version command failed".to_string(),
            ));
        }

        Self::parse(&String::from_utf8_lossy(&output.stdout))
    }

    /// Parse "git version X.Y.Z", tolerating vendor suffixes like ".windows.1"
    pub fn parse(version_str: &str) -> GitResult<Self> {
        let number = version_str
            .trim()
            .strip_prefix("git version ")
            .and_then(|rest| rest.split_whitespace().next())
            .ok_or_else(|| {
                GitError::ParseError(format!("Unexpected git version format: {}", version_str))
            })?;

        let mut fields = number.split('.');
        let mut next = |name: &str, required: bool| -> GitResult<u32> {
            match fields.next() {
                Some(field) => {
                    let digits: String = field.chars().take_while(char::is_ascii_digit).collect();
                    match digits.parse() {
                        Ok(n) => Ok(n),
                        Err(_) if !required => Ok(0),
                        Err(_) => Err(GitError::ParseError(format!(
                            "Invalid {} version in {}",
                            name, number
                        ))),
                    }
                }
                None if required => Err(GitError::ParseError(format!(
                    "Invalid version number format: {}",
                    number
                ))),
                None => Ok(0),
            }
        };

        Ok(GitVersion {
            major: next("major", true)?,
            minor: next("minor", true)?,
            patch: next("patch", false)?,
        })
    }

    /// Check if this version meets minimum requirements
    pub fn is_supported(&self) -> bool {
        *self >= MIN_GIT_VERSION
    }

    /// Detect the installed version and reject anything too old
    pub fn validate() -> GitResult<Self> {
        let version = Self::detect()?;

        if !version.is_supported() {
            return Err(GitError::GitVersionTooOld(version.to_string()));
        }

        Ok(version)
    }
}

impl fmt::Display for GitVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
