use crate::plan::model::{Plan, PlanError, RiskLevel};
use std::io;

/// How much confirmation a plan needs before it may run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationPolicy {
    /// Run immediately
    None,
    /// Single y/N question, default no
    YesNo,
    /// The user must type `yes`; anything else, including nothing, denies
    Explicit,
}

impl ConfirmationPolicy {
    /// Whether `answer` counts as consent under this policy
    pub fn accepts(&self, answer: Option<&str>) -> bool {
        let answer = answer.map(|a| a.trim().to_ascii_lowercase());
        match self {
            ConfirmationPolicy::None => true,
            ConfirmationPolicy::YesNo => matches!(answer.as_deref(), Some("y" | "yes")),
            ConfirmationPolicy::Explicit => answer.as_deref() == Some("yes"),
        }
    }

    /// Short hint shown next to the question
    pub fn hint(&self) -> &'static str {
        match self {
            ConfirmationPolicy::None => "",
            ConfirmationPolicy::YesNo => "[y/N]",
            ConfirmationPolicy::Explicit => "type 'yes' to proceed",
        }
    }
}

/// Default policy table
pub fn required_confirmation(risk_level: RiskLevel) -> ConfirmationPolicy {
    match risk_level {
        RiskLevel::Safe => ConfirmationPolicy::None,
        RiskLevel::Medium => ConfirmationPolicy::YesNo,
        RiskLevel::High => ConfirmationPolicy::Explicit,
    }
}

/// Policy for a raw label; unknown labels are refused, never treated as SAFE
pub fn required_confirmation_for_label(label: &str) -> Result<ConfirmationPolicy, PlanError> {
    Ok(required_confirmation(label.parse()?))
}

/// Source of user answers
pub trait Confirmer {
    /// Present the plan and return the raw answer, `None` on end of input
    fn confirm(&mut self, plan: &Plan, policy: ConfirmationPolicy) -> io::Result<Option<String>>;
}

/// Gate verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Denied,
}

/// Blocks or allows a plan according to its risk level
#[derive(Debug, Clone, Copy)]
pub struct RiskGate {
    confirm_medium_risk: bool,
}

impl Default for RiskGate {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskGate {
    pub fn new() -> Self {
        Self {
            confirm_medium_risk: true,
        }
    }

    /// Allow MEDIUM plans through without asking. HIGH always asks.
    pub fn with_medium_confirmation(mut self, confirm: bool) -> Self {
        self.confirm_medium_risk = confirm;
        self
    }

    pub fn policy_for(&self, risk_level: RiskLevel) -> ConfirmationPolicy {
        match (risk_level, required_confirmation(risk_level)) {
            (RiskLevel::Medium, _) if !self.confirm_medium_risk => ConfirmationPolicy::None,
            (_, policy) => policy,
        }
    }

    /// Ask for confirmation when the plan's risk requires it
    pub fn check(&self, plan: &Plan, confirmer: &mut dyn Confirmer) -> GateDecision {
        let policy = self.policy_for(plan.risk_level());
        if policy == ConfirmationPolicy::None {
            return GateDecision::Proceed;
        }

        let answer = match confirmer.confirm(plan, policy) {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(error = %e, "confirmation prompt failed; treating as denial");
                None
            }
        };

        if policy.accepts(answer.as_deref()) {
            GateDecision::Proceed
        } else {
            tracing::info!(risk = %plan.risk_level(), "plan denied at confirmation");
            GateDecision::Denied
        }
    }
}
