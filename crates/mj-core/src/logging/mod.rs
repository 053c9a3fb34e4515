//! Logging setup for the engines and `mjc`.
//!
//! - stdout carries command payloads only
//! - stderr receives log output, human-readable or JSONL
//!
//! Engines log on the fixed targets in [`targets`], so a filter such as
//! `RUST_LOG=mj_core::reward::tensor=debug` isolates cache growth.

pub mod config;
pub mod layer;

pub use config::{LogConfig, LogFormat, LogLevel};
pub use layer::JsonlLayer;

use std::io::IsTerminal;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log targets used across the crate.
pub mod targets {
    /// Sericola recursion: loads, truncation depth, eigen fallbacks.
    pub const SERIES: &str = "mj_core::reward::series";
    /// Recursion tensor growth and size limits.
    pub const TENSOR: &str = "mj_core::reward::tensor";
    /// Engine lifecycle: construction, refresh, restore.
    pub const REWARD: &str = "mj_core::reward";
    pub const JUMPS: &str = "mj_core::jumps";
    pub const SIMULATION: &str = "mj_core::uniformization";
    pub const CLI: &str = "mj_core::cli";
}

/// Default filter when `RUST_LOG` is unset or unparsable.
fn default_directive(config: &LogConfig) -> String {
    format!("mj_core={},mjc={}", config.level, config.level)
}

/// Installs the global subscriber. A second call is a no-op.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    // try_init: tests and embedding hosts may already own the global subscriber.
    let _ = match config.format {
        LogFormat::Human => {
            let layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_ansi(std::io::stderr().is_terminal());
            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer.without_time())
                    .try_init()
            }
        }
        LogFormat::Jsonl => tracing_subscriber::registry()
            .with(filter)
            .with(JsonlLayer::stderr())
            .try_init(),
    };
}

/// [`init_logging`] with environment-only configuration.
pub fn init_default_logging() {
    init_logging(&LogConfig::from_env(None, None));
}
