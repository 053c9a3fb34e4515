//! Engine configuration types.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. The truncation cap and jump-count cap are empirical
//! heuristics kept configurable rather than baked into the engines.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::validate::{ValidationError, ValidationResult};

/// Complete configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: String,
    pub engine: EngineConfig,
    pub simulation: SimulationConfig,
    pub two_state: TwoStateConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            engine: EngineConfig::default(),
            simulation: SimulationConfig::default(),
            two_state: TwoStateConfig::default(),
        }
    }
}

/// Sericola series engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Poisson tail mass left out of every truncated series.
    pub epsilon: f64,

    /// Geometric growth factor for the recursion-tensor capacity.
    pub growth_factor: f64,

    /// Lower bound of the truncation hard cap.
    pub hard_cap_floor: usize,

    /// Standard deviations above `λt` allowed before the hard cap.
    pub hard_cap_sd_multiplier: f64,

    /// Largest recursion tensor, in doubles, the engine may allocate.
    pub max_tensor_len: usize,

    /// Relative tolerance for generator row sums.
    pub generator_tolerance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-10,
            growth_factor: 1.5,
            hard_cap_floor: 5000,
            hard_cap_sd_multiplier: 10.0,
            max_tensor_len: i32::MAX as usize,
            generator_tolerance: 1e-8,
        }
    }
}

/// Endpoint-conditioned simulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Cap on the jump-count series before giving up on a draw.
    pub max_tries: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { max_tries: 1000 }
    }
}

/// Closed-form two-state occupancy series settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoStateConfig {
    pub max_terms: usize,
    /// Stop once a term falls below this fraction of the running sum.
    pub relative_tolerance: f64,
}

impl Default for TwoStateConfig {
    fn default() -> Self {
        Self {
            max_terms: 10_000,
            relative_tolerance: 1e-14,
        }
    }
}

/// On-disk encoding, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

impl Config {
    /// Load a configuration file (TOML unless the extension is `.json`).
    pub fn from_file(path: &Path) -> ValidationResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_str_with_format(&content, ConfigFormat::from_path(path))
    }

    pub fn from_str_with_format(content: &str, format: ConfigFormat) -> ValidationResult<Self> {
        match format {
            ConfigFormat::Toml => toml::from_str(content)
                .map_err(|e| ValidationError::ParseError(format!("Invalid TOML: {}", e))),
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.engine.epsilon, 1e-10);
        assert_eq!(cfg.engine.growth_factor, 1.5);
        assert_eq!(cfg.engine.hard_cap_floor, 5000);
        assert_eq!(cfg.engine.hard_cap_sd_multiplier, 10.0);
        assert_eq!(cfg.simulation.max_tries, 1000);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = Config::from_str_with_format(
            "[engine]\nepsilon = 1e-12\n\n[simulation]\nmax_tries = 50\n",
            ConfigFormat::Toml,
        )
        .unwrap();
        assert_eq!(cfg.engine.epsilon, 1e-12);
        assert_eq!(cfg.engine.growth_factor, 1.5);
        assert_eq!(cfg.simulation.max_tries, 50);
        assert_eq!(cfg.schema_version, crate::CONFIG_SCHEMA_VERSION);
    }

    #[test]
    fn json_is_accepted() {
        let cfg = Config::from_str_with_format(
            r#"{"two_state": {"max_terms": 64}}"#,
            ConfigFormat::Json,
        )
        .unwrap();
        assert_eq!(cfg.two_state.max_terms, 64);
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.JSON")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("noext")), ConfigFormat::Toml);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = Config::from_str_with_format("engine = [", ConfigFormat::Toml).unwrap_err();
        assert!(matches!(err, ValidationError::ParseError(_)));
    }
}
