//! Model files for the command-line front end.
//!
//! ```json
//! {
//!   "generator": [[-1.0, 1.0], [2.0, -2.0]],
//!   "rewards": [0.0, 1.0],
//!   "labels": ["A", "B"]
//! }
//! ```
//!
//! Only the shape is checked here; generator semantics (signs, row sums)
//! are checked by the engines that consume the matrix.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::validate::{ValidationError, ValidationResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Generator rows.
    pub generator: Vec<Vec<f64>>,

    #[serde(default)]
    pub rewards: Option<Vec<f64>>,

    #[serde(default)]
    pub labels: Option<Vec<String>>,
}

impl ModelSpec {
    pub fn from_file(path: &Path) -> ValidationResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> ValidationResult<Self> {
        let spec: Self = serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn dim(&self) -> usize {
        self.generator.len()
    }

    pub fn validate(&self) -> ValidationResult<()> {
        let dim = self.dim();
        if dim == 0 {
            return Err(ValidationError::invalid("generator", "Must have at least one row"));
        }
        for (i, row) in self.generator.iter().enumerate() {
            if row.len() != dim {
                return Err(ValidationError::invalid(
                    format!("generator[{}]", i),
                    format!("Expected {} entries, got {}", dim, row.len()),
                ));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(ValidationError::invalid(
                    format!("generator[{}]", i),
                    "Entries must be finite",
                ));
            }
        }
        if let Some(rewards) = &self.rewards {
            if rewards.len() != dim {
                return Err(ValidationError::invalid(
                    "rewards",
                    format!("Expected {} entries, got {}", dim, rewards.len()),
                ));
            }
            if rewards.iter().any(|v| !v.is_finite()) {
                return Err(ValidationError::invalid("rewards", "Entries must be finite"));
            }
        }
        if let Some(labels) = &self.labels {
            if labels.len() != dim {
                return Err(ValidationError::invalid(
                    "labels",
                    format!("Expected {} entries, got {}", dim, labels.len()),
                ));
            }
        }
        Ok(())
    }

    /// Row-major copy of the generator.
    pub fn flat_generator(&self) -> Vec<f64> {
        self.generator.iter().flatten().copied().collect()
    }

    /// Reward vector, or an error naming the missing field.
    pub fn require_rewards(&self) -> ValidationResult<&[f64]> {
        self.rewards
            .as_deref()
            .ok_or_else(|| ValidationError::invalid("rewards", "Required for reward queries"))
    }

    /// Label of state `i`, falling back to its index.
    pub fn label(&self, i: usize) -> String {
        self.labels
            .as_ref()
            .and_then(|l| l.get(i).cloned())
            .unwrap_or_else(|| i.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_flattens() {
        let spec = ModelSpec::from_json(
            r#"{"generator": [[-1.0, 1.0], [2.0, -2.0]], "rewards": [0.0, 1.0]}"#,
        )
        .unwrap();
        assert_eq!(spec.dim(), 2);
        assert_eq!(spec.flat_generator(), vec![-1.0, 1.0, 2.0, -2.0]);
        assert_eq!(spec.require_rewards().unwrap(), &[0.0, 1.0]);
        assert_eq!(spec.label(1), "1");
    }

    #[test]
    fn ragged_rows_rejected() {
        let err = ModelSpec::from_json(r#"{"generator": [[-1.0, 1.0], [2.0]]}"#).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { ref field, .. } if field == "generator[1]"));
    }

    #[test]
    fn reward_length_checked() {
        let err = ModelSpec::from_json(r#"{"generator": [[0.0]], "rewards": [1.0, 2.0]}"#)
            .unwrap_err();
        assert_eq!(err.code(), 65);
    }

    #[test]
    fn missing_rewards_reported() {
        let spec = ModelSpec::from_json(r#"{"generator": [[0.0]], "labels": ["only"]}"#).unwrap();
        assert!(spec.require_rewards().is_err());
        assert_eq!(spec.label(0), "only");
    }
}
