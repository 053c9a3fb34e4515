//! Error types for the Markov jump/reward engines.
//!
//! Every error carries:
//! - A stable numeric code grouped by category
//! - A category for coarse handling
//! - A recoverability hint: range, iteration-limit and lifecycle errors can
//!   be fixed by the caller (other input, another draw, another call order);
//!   configuration and capacity errors cannot.
//!
//! ```json
//! {
//!   "code": 20,
//!   "category": "range",
//!   "message": "reward 3.5 outside achievable range [0, 2]",
//!   "recoverable": true,
//!   "suggested_action": "fix_input"
//! }
//! ```

use mj_config::ValidationError;
use mj_math::{EigenError, MatrixError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, MarkovError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid dimension, generator, rewards or settings.
    Config,
    /// A query outside the valid domain.
    Range,
    /// Iteration caps and decomposition failures.
    Numerical,
    /// Cache or truncation limits exceeded.
    Capacity,
    /// Operations called in the wrong state (finalized history, stale cache).
    Lifecycle,
    /// File and serialization errors at the CLI boundary.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Range => write!(f, "range"),
            ErrorCategory::Numerical => write!(f, "numerical"),
            ErrorCategory::Capacity => write!(f, "capacity"),
            ErrorCategory::Lifecycle => write!(f, "lifecycle"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// What a caller can do about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    FixInput,
    FixConfiguration,
    /// Draw again (or reject the MCMC proposal).
    Retry,
    /// Call `prepare`/`refresh` on the engine first.
    Prepare,
    Abort,
}

#[derive(Error, Debug)]
pub enum MarkovError {
    // Configuration errors (10-19)
    #[error("invalid state-space dimension {0}")]
    InvalidDimension(usize),

    #[error("epsilon must be in (0, 1), got {0}")]
    InvalidEpsilon(f64),

    #[error("malformed generator: {0}")]
    MalformedGenerator(#[from] MatrixError),

    #[error("reward rates must be strictly increasing after sorting; tie at position {position} (rate {rate})")]
    RewardTie { position: usize, rate: f64 },

    #[error("reward vector has {actual} entries, expected {expected}")]
    RewardLength { expected: usize, actual: usize },

    #[error("reward rate for state {state} is not finite")]
    NonFiniteReward { state: usize },

    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),

    #[error("two-state occupancy needs a 2x2 generator with positive exit rates")]
    NotTwoState,

    // Range errors (20-29)
    #[error("reward {reward} outside achievable range [{lower}, {upper}]")]
    RewardOutOfRange { reward: f64, lower: f64, upper: f64 },

    #[error("time must be positive and finite, got {0}")]
    NonPositiveTime(f64),

    #[error("state {state} out of bounds for dimension {dim}")]
    StateOutOfBounds { state: usize, dim: usize },

    #[error("{what}: expected length {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("recursion cache holds depth {capacity}, query needs {required}; call prepare() first")]
    CacheNotPrepared { required: usize, capacity: usize },

    #[error("state pair ({from}, {to}) is not supported by this engine")]
    UnsupportedStates { from: usize, to: usize },

    #[error("{engine} does not provide {query}")]
    UnsupportedQuery {
        engine: &'static str,
        query: &'static str,
    },

    // Numerical errors (30-39)
    #[error("jump-count draw exceeded {tries} terms (start {start}, end {end}, time {time}); endpoint probability may be inaccurate")]
    IterationLimit {
        tries: usize,
        start: usize,
        end: usize,
        time: f64,
    },

    #[error("eigen-decomposition failed: {0}")]
    Eigen(#[from] EigenError),

    #[error("endpoint {start} -> {end} has probability {probability}; cannot condition on it")]
    ImpossibleEndpoint {
        start: usize,
        end: usize,
        probability: f64,
    },

    #[error("occupancy series did not converge within {terms} terms (x {x}, time {time})")]
    SeriesLimit { terms: usize, x: f64, time: f64 },

    // Capacity errors (40-49)
    #[error("Poisson truncation hit its hard cap {cap} at λt = {lambda_t}\n{diagnostics}")]
    TruncationDepthExceeded {
        cap: usize,
        lambda_t: f64,
        diagnostics: String,
    },

    #[error("recursion tensor would need {required} doubles (limit {limit})\n{diagnostics}")]
    TensorTooLarge {
        required: u128,
        limit: usize,
        diagnostics: String,
    },

    // Lifecycle errors (50-59)
    #[error("state history is already finalized")]
    HistoryFinalized,

    #[error("state history is still open; append an ending state first")]
    HistoryOpen,

    #[error("state change at {time} precedes the previous event at {previous}")]
    ChangeOutOfOrder { time: f64, previous: f64 },

    #[error("upstream generator or reward rates changed since the last refresh")]
    StaleModel,

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MarkovError {
    /// Stable error code:
    /// - 10-19: configuration
    /// - 20-29: range
    /// - 30-39: numerical
    /// - 40-49: capacity
    /// - 50-59: lifecycle
    /// - 60-69: I/O
    pub fn code(&self) -> u32 {
        match self {
            MarkovError::InvalidDimension(_) => 10,
            MarkovError::InvalidEpsilon(_) => 11,
            MarkovError::MalformedGenerator(_) => 12,
            MarkovError::RewardTie { .. } => 13,
            MarkovError::RewardLength { .. } => 14,
            MarkovError::NonFiniteReward { .. } => 15,
            MarkovError::Config(_) => 16,
            MarkovError::NotTwoState => 17,
            MarkovError::RewardOutOfRange { .. } => 20,
            MarkovError::NonPositiveTime(_) => 21,
            MarkovError::StateOutOfBounds { .. } => 22,
            MarkovError::ShapeMismatch { .. } => 23,
            MarkovError::CacheNotPrepared { .. } => 24,
            MarkovError::UnsupportedStates { .. } => 25,
            MarkovError::UnsupportedQuery { .. } => 26,
            MarkovError::IterationLimit { .. } => 30,
            MarkovError::Eigen(_) => 31,
            MarkovError::ImpossibleEndpoint { .. } => 32,
            MarkovError::SeriesLimit { .. } => 33,
            MarkovError::TruncationDepthExceeded { .. } => 40,
            MarkovError::TensorTooLarge { .. } => 41,
            MarkovError::HistoryFinalized => 50,
            MarkovError::HistoryOpen => 51,
            MarkovError::ChangeOutOfOrder { .. } => 52,
            MarkovError::StaleModel => 53,
            MarkovError::Io(_) => 60,
            MarkovError::Json(_) => 61,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.code() {
            10..=19 => ErrorCategory::Config,
            20..=29 => ErrorCategory::Range,
            30..=39 => ErrorCategory::Numerical,
            40..=49 => ErrorCategory::Capacity,
            50..=59 => ErrorCategory::Lifecycle,
            _ => ErrorCategory::Io,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::Range | ErrorCategory::Lifecycle | ErrorCategory::Io => true,
            ErrorCategory::Numerical => matches!(self, MarkovError::IterationLimit { .. }),
            ErrorCategory::Config | ErrorCategory::Capacity => false,
        }
    }

    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            MarkovError::IterationLimit { .. } => SuggestedAction::Retry,
            MarkovError::CacheNotPrepared { .. } | MarkovError::StaleModel => {
                SuggestedAction::Prepare
            }
            MarkovError::Eigen(_) => SuggestedAction::Abort,
            MarkovError::SeriesLimit { .. } => SuggestedAction::FixConfiguration,
            _ => match self.category() {
                ErrorCategory::Config => SuggestedAction::FixConfiguration,
                ErrorCategory::Capacity => SuggestedAction::Abort,
                _ => SuggestedAction::FixInput,
            },
        }
    }

    /// Structured form for machine consumers.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code(),
            "category": self.category(),
            "message": self.to_string(),
            "recoverable": self.is_recoverable(),
            "suggested_action": self.suggested_action(),
        })
    }
}

/// Rejects non-positive or non-finite times.
pub fn check_time(time: f64) -> Result<()> {
    if time > 0.0 && time.is_finite() {
        Ok(())
    } else {
        Err(MarkovError::NonPositiveTime(time))
    }
}

pub(crate) fn check_state(state: usize, dim: usize) -> Result<()> {
    if state < dim {
        Ok(())
    } else {
        Err(MarkovError::StateOutOfBounds { state, dim })
    }
}

pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(MarkovError::ShapeMismatch {
            what,
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_code_ranges() {
        assert_eq!(MarkovError::InvalidEpsilon(0.0).category(), ErrorCategory::Config);
        assert_eq!(
            MarkovError::RewardOutOfRange {
                reward: 3.0,
                lower: 0.0,
                upper: 1.0
            }
            .category(),
            ErrorCategory::Range
        );
        assert_eq!(
            MarkovError::TensorTooLarge {
                required: 10,
                limit: 5,
                diagnostics: String::new()
            }
            .category(),
            ErrorCategory::Capacity
        );
        assert_eq!(MarkovError::HistoryOpen.category(), ErrorCategory::Lifecycle);
    }

    #[test]
    fn recoverability() {
        let limit = MarkovError::IterationLimit {
            tries: 1000,
            start: 0,
            end: 1,
            time: 1.0,
        };
        assert!(limit.is_recoverable());
        assert_eq!(limit.suggested_action(), SuggestedAction::Retry);

        let tie = MarkovError::RewardTie {
            position: 1,
            rate: 0.5,
        };
        assert!(!tie.is_recoverable());
        assert_eq!(tie.suggested_action(), SuggestedAction::FixConfiguration);

        assert!(MarkovError::NonPositiveTime(0.0).is_recoverable());
        assert!(!MarkovError::Eigen(EigenError::SingularEigenvectors).is_recoverable());
    }

    #[test]
    fn series_limit_is_not_a_retry() {
        let err = MarkovError::SeriesLimit {
            terms: 10,
            x: 0.5,
            time: 1.0,
        };
        assert_eq!(err.code(), 33);
        assert_eq!(err.category(), ErrorCategory::Numerical);
        assert!(!err.is_recoverable());
        assert_eq!(err.suggested_action(), SuggestedAction::FixConfiguration);
        assert!(err.to_string().contains("10 terms"));
    }

    #[test]
    fn unsupported_query_is_range() {
        let err = MarkovError::UnsupportedQuery {
            engine: "two-state occupancy",
            query: "cdf entries",
        };
        assert_eq!(err.code(), 26);
        assert_eq!(err.category(), ErrorCategory::Range);
        assert_eq!(err.suggested_action(), SuggestedAction::FixInput);
    }

    #[test]
    fn json_shape() {
        let err = MarkovError::StateOutOfBounds { state: 4, dim: 3 };
        let json = err.to_json();
        assert_eq!(json["code"], 22);
        assert_eq!(json["category"], "range");
        assert_eq!(json["recoverable"], true);
        assert_eq!(json["suggested_action"], "fix_input");
    }

    #[test]
    fn validators() {
        assert!(check_time(1.0).is_ok());
        assert!(check_time(0.0).is_err());
        assert!(check_time(f64::INFINITY).is_err());
        assert!(check_state(2, 3).is_ok());
        assert!(check_state(3, 3).is_err());
        assert!(check_len("out", 4, 4).is_ok());
        assert!(check_len("out", 4, 9).is_err());
    }
}
