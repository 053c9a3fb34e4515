//! Exit codes for the `mjc` binary.
//!
//! Exit code ranges:
//! - 0: success
//! - 10-19: bad input (arguments, configuration, queries out of range)
//! - 20-29: the engine could not produce a result
//! - 30: I/O

use crate::error::{ErrorCategory, MarkovError};

/// Process exit codes. Stable for scripts driving `mjc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Ok = 0,

    // ========================================================================
    // Input errors (10-19)
    // ========================================================================
    /// Invalid arguments
    ArgsError = 10,

    /// Invalid configuration or model file
    ConfigError = 11,

    /// Query outside the valid domain (reward, time, state index)
    RangeError = 12,

    // ========================================================================
    // Engine errors (20-29)
    // ========================================================================
    /// Decomposition failure, exhausted draw, or misuse of engine state
    NumericalError = 20,

    /// Truncation cap or tensor size limit hit
    CapacityError = 21,

    // ========================================================================
    // I/O (30)
    // ========================================================================
    IoError = 30,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Ok
    }

    /// Input errors; rerunning with other input can succeed.
    pub fn is_input_error(self) -> bool {
        (10..20).contains(&self.as_i32())
    }

    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Ok => "OK",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::RangeError => "ERR_RANGE",
            ExitCode::NumericalError => "ERR_NUMERICAL",
            ExitCode::CapacityError => "ERR_CAPACITY",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<&MarkovError> for ExitCode {
    fn from(err: &MarkovError) -> Self {
        if let MarkovError::Config(mj_config::ValidationError::IoError(_)) = err {
            return ExitCode::IoError;
        }
        match err.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Range => ExitCode::RangeError,
            ErrorCategory::Numerical | ErrorCategory::Lifecycle => ExitCode::NumericalError,
            ErrorCategory::Capacity => ExitCode::CapacityError,
            ErrorCategory::Io => ExitCode::IoError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_stable() {
        assert_eq!(ExitCode::Ok.as_i32(), 0);
        assert_eq!(ExitCode::ArgsError.as_i32(), 10);
        assert_eq!(ExitCode::ConfigError.as_i32(), 11);
        assert_eq!(ExitCode::RangeError.as_i32(), 12);
        assert_eq!(ExitCode::NumericalError.as_i32(), 20);
        assert_eq!(ExitCode::CapacityError.as_i32(), 21);
        assert_eq!(ExitCode::IoError.as_i32(), 30);
    }

    #[test]
    fn maps_error_categories() {
        assert_eq!(
            ExitCode::from(&MarkovError::InvalidDimension(0)),
            ExitCode::ConfigError
        );
        assert_eq!(
            ExitCode::from(&MarkovError::NonPositiveTime(-1.0)),
            ExitCode::RangeError
        );
        assert_eq!(
            ExitCode::from(&MarkovError::TruncationDepthExceeded {
                cap: 5,
                lambda_t: 100.0,
                diagnostics: String::new(),
            }),
            ExitCode::CapacityError
        );
        assert_eq!(ExitCode::from(&MarkovError::StaleModel), ExitCode::NumericalError);
        assert_eq!(
            ExitCode::from(&MarkovError::SeriesLimit {
                terms: 10,
                x: 0.5,
                time: 1.0,
            }),
            ExitCode::NumericalError
        );
        let io = MarkovError::Config(mj_config::ValidationError::IoError("gone".into()));
        assert_eq!(ExitCode::from(&io), ExitCode::IoError);
    }

    #[test]
    fn display() {
        assert_eq!(ExitCode::RangeError.to_string(), "ERR_RANGE (12)");
        assert!(ExitCode::Ok.is_success());
        assert!(ExitCode::RangeError.is_input_error());
        assert!(!ExitCode::CapacityError.is_input_error());
    }
}
