use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Empty command")]
    EmptyCommand,

    #[error("Not a git invocation: {0}")]
    NotGit(String),

    #[error("Command contains shell operator {0}; commands are run without a shell")]
    SuspiciousOperators(String),

    #[error("Command contains disallowed global option: {0}")]
    DangerousFlags(String),

    #[error("Unbalanced quotes")]
    Unparsable,

    #[error("Missing git subcommand")]
    InvalidFormat,
}

/// A plan command that passed boundary checks, split into git's argv
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCommand {
    pub command: String,
    /// Arguments after the leading `git`
    pub args: Vec<String>,
}

/// Global options that would point git at another repository or inject config
const DANGEROUS_GLOBAL_OPTIONS: &[&str] = &[
    "-C",
    "-c",
    "--git-dir",
    "--work-tree",
    "--namespace",
    "--config-env",
    "--exec-path",
];

/// Checks that plan commands are plain git invocations
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandValidator;

impl CommandValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a shell-level git command and split it into arguments
    pub fn validate(&self, command: &str) -> Result<ValidatedCommand, ValidationError> {
        let command = command.trim();

        if command.is_empty() {
            return Err(ValidationError::EmptyCommand);
        }

        self.check_for_injection(command)?;

        let tokens = shlex::split(command).ok_or(ValidationError::Unparsable)?;
        let (program, args) = tokens.split_first().ok_or(ValidationError::EmptyCommand)?;

        if program != "git" {
            return Err(ValidationError::NotGit(program.clone()));
        }

        self.check_global_options(args)?;

        Ok(ValidatedCommand {
            command: command.to_string(),
            args: args.to_vec(),
        })
    }

    /// Reject shell control syntax the plan author expected a shell to interpret
    ///
    /// Single-quoted text is literal. Inside double quotes only command
    /// substitution is flagged, since a shell would still expand it there.
    fn check_for_injection(&self, command: &str) -> Result<(), ValidationError> {
        let mut chars = command.chars().peekable();
        let mut in_single = false;
        let mut in_double = false;

        while let Some(c) = chars.next() {
            match c {
                '\'' if !in_double => in_single = !in_single,
                '"' if !in_single => in_double = !in_double,
                '\\' if !in_single => {
                    chars.next();
                }
                _ if in_single => {}
                '`' => return Err(ValidationError::SuspiciousOperators("`".to_string())),
                '$' if chars.peek() == Some(&'(') => {
                    return Err(ValidationError::SuspiciousOperators("$(".to_string()));
                }
                '$' if chars
                    .peek()
                    .is_some_and(|n| *n == '{' || *n == '_' || n.is_ascii_alphabetic()) =>
                {
                    return Err(ValidationError::SuspiciousOperators("$".to_string()));
                }
                _ if in_double => {}
                ';' | '|' | '&' | '<' | '>' | '\n' => {
                    let mut op = c.to_string();
                    if let Some(&next) = chars.peek() {
                        if next == c {
                            op.push(next);
                        }
                    }
                    return Err(ValidationError::SuspiciousOperators(op.escape_default().to_string()));
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Inspect options between `git` and the subcommand
    fn check_global_options(&self, args: &[String]) -> Result<(), ValidationError> {
        for arg in args {
            if !arg.starts_with('-') {
                return Ok(());
            }
            let name = arg.split('=').next().unwrap_or(arg);
            if DANGEROUS_GLOBAL_OPTIONS.contains(&name) {
                return Err(ValidationError::DangerousFlags(name.to_string()));
            }
        }

        Err(ValidationError::InvalidFormat)
    }
}
