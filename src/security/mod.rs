pub mod gate;
pub mod validator;

pub use gate::{
    ConfirmationPolicy, Confirmer, GateDecision, RiskGate, required_confirmation,
    required_confirmation_for_label,
};
pub use validator::{CommandValidator, ValidatedCommand, ValidationError};
