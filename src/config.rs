//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory (or
//! the file named by `AETHER_CONFIG`), then applies `AETHER_DATA_DIR` and
//! `AETHER_LOG_LEVEL` env overrides. Every section and key is optional.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;
use crate::graph::SearchOptions;
use crate::layout::{LayoutParams, Surface};
use crate::logger;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Layout defaults used by the CLI when no flags are given.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    pub surface: Surface,
    pub iterations: usize,
}

impl LayoutConfig {
    pub fn params(&self) -> LayoutParams {
        LayoutParams {
            iterations: self.iterations,
            ..LayoutParams::default()
        }
    }
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the database (already expanded, no `~`).
    pub data_dir: PathBuf,
    /// Database file name inside `data_dir`.
    pub db_file: String,
    pub log_level: String,
    pub search: SearchOptions,
    pub layout: LayoutConfig,
}

impl Config {
    /// Full path of the database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }
}

/// Raw TOML shape: `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    store: RawStore,
    #[serde(default)]
    search: RawSearch,
    #[serde(default)]
    layout: RawLayout,
}

#[derive(Deserialize)]
struct RawStore {
    #[serde(default = "default_data_dir")]
    data_dir: String,
    #[serde(default = "default_db_file")]
    db_file: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

impl Default for RawStore {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_file: default_db_file(),
            log_level: default_log_level(),
        }
    }
}

fn default_data_dir() -> String { "~/.aether".to_string() }
fn default_db_file() -> String { "aether.db".to_string() }
fn default_log_level() -> String { "info".to_string() }

/// Search keys fall back to [`SearchOptions::default`] one by one.
#[derive(Deserialize, Default)]
struct RawSearch {
    limit: Option<usize>,
    snippet_tokens: Option<usize>,
    highlight_open: Option<String>,
    highlight_close: Option<String>,
    ellipsis: Option<String>,
    prefix_last_token: Option<bool>,
}

impl RawSearch {
    fn resolve(self) -> SearchOptions {
        let d = SearchOptions::default();
        SearchOptions {
            limit: self.limit.unwrap_or(d.limit),
            snippet_tokens: self.snippet_tokens.unwrap_or(d.snippet_tokens),
            highlight_open: self.highlight_open.unwrap_or(d.highlight_open),
            highlight_close: self.highlight_close.unwrap_or(d.highlight_close),
            ellipsis: self.ellipsis.unwrap_or(d.ellipsis),
            prefix_last_token: self.prefix_last_token.unwrap_or(d.prefix_last_token),
        }
    }
}

#[derive(Deserialize)]
struct RawLayout {
    #[serde(default = "default_width")]
    width: f64,
    #[serde(default = "default_height")]
    height: f64,
    #[serde(default = "default_iterations")]
    iterations: usize,
}

impl Default for RawLayout {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            iterations: default_iterations(),
        }
    }
}

fn default_width() -> f64 { 800.0 }
fn default_height() -> f64 { 600.0 }
fn default_iterations() -> usize { LayoutParams::default().iterations }

/// Load config from `config/default.toml` (or `AETHER_CONFIG`), then apply
/// env-var overrides.
pub fn load() -> Result<Config, AppError> {
    let path = env::var("AETHER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let data_dir_override = env::var("AETHER_DATA_DIR").ok();
    let log_level_override = env::var("AETHER_LOG_LEVEL").ok();
    load_from(
        Path::new(&path),
        data_dir_override.as_deref(),
        log_level_override.as_deref(),
    )
}

/// Internal loader: accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    data_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let s = parsed.store;
    let data_dir = expand_home(data_dir_override.unwrap_or(&s.data_dir));
    let log_level = log_level_override.unwrap_or(&s.log_level).to_string();

    // Full filter directives (`aether_graph=debug`) are checked by the subscriber.
    if !log_level.contains('=') {
        logger::parse_level(&log_level).map_err(|e| AppError::Config(e.to_string()))?;
    }

    if s.db_file.trim().is_empty() {
        return Err(AppError::Config("store.db_file must not be empty".into()));
    }

    let l = parsed.layout;
    for (name, value) in [("layout.width", l.width), ("layout.height", l.height)] {
        if !(value.is_finite() && value > 0.0) {
            return Err(AppError::Config(format!("{name} must be positive, got {value}")));
        }
    }

    Ok(Config {
        data_dir,
        db_file: s.db_file,
        log_level,
        search: parsed.search.resolve(),
        layout: LayoutConfig {
            surface: Surface::new(l.width, l.height),
            iterations: l.iterations,
        },
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

#[cfg(test)]
impl Config {
    /// Defaults with the database under `data_dir`.
    pub fn test_default(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            db_file: default_db_file(),
            log_level: "info".into(),
            search: SearchOptions::default(),
            layout: LayoutConfig {
                surface: Surface::new(default_width(), default_height()),
                iterations: default_iterations(),
            },
        }
    }
}
