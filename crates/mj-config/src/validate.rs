//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::engine::{Config, EngineConfig, SimulationConfig, TwoStateConfig};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SemanticError(_) => 63,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &Config) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }
    validate_engine(&config.engine)?;
    validate_simulation(&config.simulation)?;
    validate_two_state(&config.two_state)?;
    Ok(())
}

pub fn validate_engine(engine: &EngineConfig) -> ValidationResult<()> {
    if !(engine.epsilon > 0.0 && engine.epsilon < 1.0) {
        return Err(ValidationError::invalid(
            "engine.epsilon",
            format!("Must be in (0, 1), got {}", engine.epsilon),
        ));
    }
    if !(engine.growth_factor > 1.0 && engine.growth_factor.is_finite()) {
        return Err(ValidationError::invalid(
            "engine.growth_factor",
            format!("Must be finite and > 1, got {}", engine.growth_factor),
        ));
    }
    if engine.hard_cap_floor == 0 {
        return Err(ValidationError::invalid("engine.hard_cap_floor", "Must be positive"));
    }
    if !(engine.hard_cap_sd_multiplier >= 0.0 && engine.hard_cap_sd_multiplier.is_finite()) {
        return Err(ValidationError::invalid(
            "engine.hard_cap_sd_multiplier",
            format!("Must be finite and >= 0, got {}", engine.hard_cap_sd_multiplier),
        ));
    }
    if engine.max_tensor_len == 0 {
        return Err(ValidationError::invalid("engine.max_tensor_len", "Must be positive"));
    }
    if !(engine.generator_tolerance > 0.0 && engine.generator_tolerance < 1.0) {
        return Err(ValidationError::invalid(
            "engine.generator_tolerance",
            format!("Must be in (0, 1), got {}", engine.generator_tolerance),
        ));
    }
    Ok(())
}

pub fn validate_simulation(simulation: &SimulationConfig) -> ValidationResult<()> {
    if simulation.max_tries == 0 {
        return Err(ValidationError::invalid("simulation.max_tries", "Must be positive"));
    }
    Ok(())
}

pub fn validate_two_state(two_state: &TwoStateConfig) -> ValidationResult<()> {
    if two_state.max_terms == 0 {
        return Err(ValidationError::invalid("two_state.max_terms", "Must be positive"));
    }
    if !(two_state.relative_tolerance > 0.0 && two_state.relative_tolerance < 1.0) {
        return Err(ValidationError::invalid(
            "two_state.relative_tolerance",
            format!("Must be in (0, 1), got {}", two_state.relative_tolerance),
        ));
    }
    Ok(())
}
