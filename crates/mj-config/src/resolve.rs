//! Configuration file resolution.
//!
//! Resolution order: CLI argument → `MJ_CONFIG` → `MJ_CONFIG_DIR/engine.toml`
//! → XDG config directory → built-in defaults.

use std::path::{Path, PathBuf};

use crate::engine::Config;
use crate::validate::{validate_config, ValidationError, ValidationResult};

/// Where the configuration came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    CliArgument,
    Environment,
    XdgConfig,
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

const ENV_CONFIG_PATH: &str = "MJ_CONFIG";
const ENV_CONFIG_DIR: &str = "MJ_CONFIG_DIR";
const CONFIG_FILENAME: &str = "engine.toml";
const APP_NAME: &str = "markov-jumps";

/// Find the configuration file to use, if any.
///
/// An explicit CLI path is returned even if it does not exist so the
/// subsequent load reports the I/O error instead of silently falling back.
pub fn resolve_config_path(cli_path: Option<&Path>) -> (Option<PathBuf>, ConfigSource) {
    if let Some(path) = cli_path {
        return (Some(path.to_path_buf()), ConfigSource::CliArgument);
    }

    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return (Some(path), ConfigSource::Environment);
        }
    }

    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = PathBuf::from(dir).join(CONFIG_FILENAME);
        if path.exists() {
            return (Some(path), ConfigSource::Environment);
        }
    }

    if let Some(xdg) = dirs::config_dir() {
        let path = xdg.join(APP_NAME).join(CONFIG_FILENAME);
        if path.exists() {
            return (Some(path), ConfigSource::XdgConfig);
        }
    }

    (None, ConfigSource::BuiltinDefault)
}

/// Resolve, load and validate the configuration.
pub fn load_config(cli_path: Option<&Path>) -> ValidationResult<(Config, ConfigSource)> {
    let (path, source) = resolve_config_path(cli_path);
    let config = match path {
        Some(path) => Config::from_file(&path)?,
        None => Config::default(),
    };
    validate_config(&config).map_err(|e| match e {
        ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
            field: format!("{} ({})", field, source),
            message,
        },
        other => other,
    })?;
    Ok((config, source))
}
