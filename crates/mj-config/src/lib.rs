//! Configuration for the Markov jump/reward engines.
//!
//! This crate provides:
//! - Typed engine settings (truncation tolerance, cache growth, iteration caps)
//! - Config file resolution (CLI → env → XDG → defaults)
//! - Semantic validation with stable error codes
//! - The JSON model file consumed by the `mjc` binary

pub mod engine;
pub mod model;
pub mod resolve;
pub mod validate;

pub use engine::{Config, EngineConfig, SimulationConfig, TwoStateConfig};
pub use model::ModelSpec;
pub use resolve::{load_config, resolve_config_path, ConfigSource};
pub use validate::{ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
