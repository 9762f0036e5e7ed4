use crate::security::validator::{CommandValidator, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reasons an incoming plan is refused before anything touches the repository
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Malformed plan: {0}")]
    Malformed(String),

    #[error("Malformed plan JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed plan: command {index} ({command:?}) rejected: {source}")]
    Command {
        index: usize,
        command: String,
        #[source]
        source: ValidationError,
    },

    #[error("Invalid risk level '{0}': expected SAFE, MEDIUM or HIGH")]
    InvalidRiskLevel(String),
}

impl PlanError {
    /// Everything except an unknown risk label is a structural problem
    pub fn is_malformed(&self) -> bool {
        !matches!(self, PlanError::InvalidRiskLevel(_))
    }
}

/// Risk classification attached to every plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Safe,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "SAFE",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

impl FromStr for RiskLevel {
    type Err = PlanError;

    /// Case-insensitive; `LOW` is what the intent engine emits for SAFE.
    /// Anything else is refused rather than defaulted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SAFE" | "LOW" => Ok(RiskLevel::Safe),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            _ => Err(PlanError::InvalidRiskLevel(s.to_string())),
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plan exactly as it arrives from the intent engine, nothing checked yet
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlan {
    #[serde(default)]
    pub summary: String,
    #[serde(alias = "risk_level")]
    pub risk: String,
    #[serde(default)]
    pub commands: Vec<String>,
}

/// A command that passed validation, with its argv pre-split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCommand {
    text: String,
    args: Vec<String>,
}

impl PlannedCommand {
    /// The command as written in the plan
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Arguments passed to the git binary
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// A validated execution plan
///
/// Fields are private so a `Plan` can only be obtained through validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    summary: String,
    risk_level: RiskLevel,
    commands: Vec<PlannedCommand>,
}

impl Plan {
    pub fn new<S, I, C>(summary: S, risk_level: RiskLevel, commands: I) -> Result<Self, PlanError>
    where
        S: Into<String>,
        I: IntoIterator<Item = C>,
        C: AsRef<str>,
    {
        let validator = CommandValidator::new();
        let commands = commands
            .into_iter()
            .enumerate()
            .map(|(index, command)| {
                let command = command.as_ref();
                validator
                    .validate(command)
                    .map(|v| PlannedCommand {
                        text: v.command,
                        args: v.args,
                    })
                    .map_err(|source| PlanError::Command {
                        index,
                        command: command.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if commands.is_empty() {
            return Err(PlanError::Malformed("plan contains no commands".to_string()));
        }

        Ok(Self {
            summary: summary.into(),
            risk_level,
            commands,
        })
    }

    /// Parse and validate a plan from the intent engine's JSON
    pub fn from_json(json: &str) -> Result<Self, PlanError> {
        let raw: RawPlan = serde_json::from_str(json)?;
        Self::try_from(raw)
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn commands(&self) -> &[PlannedCommand] {
        &self.commands
    }
}

impl TryFrom<RawPlan> for Plan {
    type Error = PlanError;

    fn try_from(raw: RawPlan) -> Result<Self, Self::Error> {
        if raw.commands.is_empty() {
            return Err(PlanError::Malformed("plan contains no commands".to_string()));
        }
        let risk_level = raw.risk.parse()?;
        Plan::new(raw.summary, risk_level, raw.commands)
    }
}
