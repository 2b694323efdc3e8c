//! Tracing subscriber setup for the CLI.
//!
//! Library code only emits `tracing` events. The binary installs one
//! subscriber on stderr; stdout carries command output such as layout JSON.

use std::env;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Install the global subscriber for the configured `level`.
///
/// `level` may be a bare level or any `EnvFilter` directive, e.g.
/// `"aether_graph=debug"`. See [`build_filter`] for how it combines with
/// `RUST_LOG`.
pub fn init(level: &str, prefer_level: bool) -> Result<(), AppError> {
    let rust_log = env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(level, prefer_level, rust_log.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("subscriber already installed: {e}")))
}

/// Pick the filter from the configured level and a `RUST_LOG` value.
///
/// The preferred source is tried first; the other one is used only when the
/// preferred one is missing or unparsable. `prefer_level` makes the config
/// level preferred.
pub fn build_filter(
    level: &str,
    prefer_level: bool,
    rust_log: Option<&str>,
) -> Result<EnvFilter, AppError> {
    let from_level = || EnvFilter::try_new(level).map_err(|e| format!("log level '{level}': {e}"));
    let from_env = || match rust_log {
        Some(directive) => EnvFilter::try_new(directive).map_err(|e| format!("RUST_LOG '{directive}': {e}")),
        None => Err("RUST_LOG unset".to_string()),
    };

    let filter = if prefer_level {
        from_level().or_else(|a| from_env().map_err(|b| format!("{a}; {b}")))
    } else {
        from_env().or_else(|a| from_level().map_err(|b| format!("{a}; {b}")))
    };
    filter.map_err(AppError::Logger)
}

/// Parse a bare level such as `"info"`.
///
/// Config loading calls this so a typo fails before any subscriber exists.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger("log level is empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unknown log level '{level}'")))
}
