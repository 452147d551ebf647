//! Tool configuration.
//!
//! Which executables to run and how to run them. Configuration is an explicit
//! value ([`MagickConfig`]) handed to builders and clients; a process-wide
//! default is kept only as a convenience ([`set_defaults`] / [`defaults`]).
//!
//! ## Config File
//!
//! The CLI reads `magick-pipe.toml` from the working directory, or the file
//! given with `--config`. Every key is optional:
//!
//! ```toml
//! executable = "convert"             # Command for transforms
//! identify_executable = "identify"   # Command for identify/dimensions
//!
//! [execution]
//! shell = "sh"                       # Shell that runs the rendered line
//! max_buffer = 104857600             # Max buffered output per pipe (bytes)
//! # timeout_secs = 30                # Kill the tool after this long
//! # current_dir = "/tmp"             # Working directory for the tool
//!
//! [execution.env]
//! # MAGICK_MEMORY_LIMIT = "256MB"    # Extra environment variables
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;

/// File name looked up by [`load_config`].
pub const CONFIG_FILE_NAME: &str = "magick-pipe.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Executables and execution tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MagickConfig {
    /// Transform command. May carry an environment prefix, e.g.
    /// `MAGICK_MEMORY_LIMIT=256MB /usr/bin/convert`, since it runs in a shell.
    pub executable: String,
    /// Command for identify and dimension queries.
    pub identify_executable: String,
    pub execution: ExecutionTuning,
}

impl Default for MagickConfig {
    fn default() -> Self {
        Self {
            executable: "convert".to_string(),
            identify_executable: "identify".to_string(),
            execution: ExecutionTuning::default(),
        }
    }
}

impl MagickConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executable.trim().is_empty() {
            return Err(ConfigError::Validation(
                "executable must not be empty".into(),
            ));
        }
        if self.identify_executable.trim().is_empty() {
            return Err(ConfigError::Validation(
                "identify_executable must not be empty".into(),
            ));
        }
        if self.execution.shell.trim().is_empty() {
            return Err(ConfigError::Validation(
                "execution.shell must not be empty".into(),
            ));
        }
        if self.execution.max_buffer == 0 {
            return Err(ConfigError::Validation(
                "execution.max_buffer must be greater than 0".into(),
            ));
        }
        if self.execution.timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "execution.timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// How the external tool is spawned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionTuning {
    /// Shell used as `<shell> -c <command line>`.
    pub shell: String,
    /// Upper bound for buffered stdout/stderr, and for stream sources that
    /// have to be held in memory.
    pub max_buffer: usize,
    /// Kill the tool and fail after this many seconds. No limit when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_dir: Option<PathBuf>,
    /// Extra environment variables for the tool.
    pub env: BTreeMap<String, String>,
}

impl Default for ExecutionTuning {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            max_buffer: 100 * 1024 * 1024,
            timeout_secs: None,
            current_dir: None,
            env: BTreeMap::new(),
        }
    }
}

impl ExecutionTuning {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

// =============================================================================
// Process-wide defaults
// =============================================================================

static DEFAULTS: LazyLock<RwLock<MagickConfig>> =
    LazyLock::new(|| RwLock::new(MagickConfig::default()));

/// Replace the process-wide defaults. Last writer wins.
pub fn set_defaults(config: MagickConfig) {
    *DEFAULTS.write().unwrap_or_else(PoisonError::into_inner) = config;
}

/// Snapshot of the process-wide defaults.
pub fn defaults() -> MagickConfig {
    DEFAULTS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(MagickConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Parse a config file's contents on top of the stock defaults and validate.
pub fn parse_config(content: &str) -> Result<MagickConfig, ConfigError> {
    let overlay: toml::Value = toml::from_str(content)?;
    let config: MagickConfig = merge_toml(stock_defaults_value(), overlay).try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from an explicit file. The file must exist.
pub fn load_config_file(path: &Path) -> Result<MagickConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load `magick-pipe.toml` from `dir`, falling back to the stock defaults
/// when there is no such file.
pub fn load_config(dir: &Path) -> Result<MagickConfig, ConfigError> {
    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(MagickConfig::default());
    }
    load_config_file(&path)
}

/// Returns a fully-commented stock config file.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# magick-pipe configuration
# =========================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# Command used for transforms. Runs through the shell, so an environment
# prefix works: executable = "MAGICK_MEMORY_LIMIT=256MB /usr/bin/convert"
executable = "convert"

# Command used for identify and dimension queries.
identify_executable = "identify"

# ---------------------------------------------------------------------------
# Execution
# ---------------------------------------------------------------------------
[execution]
# Shell that runs the rendered command line as `<shell> -c <line>`.
shell = "sh"

# Maximum bytes buffered from the tool's stdout/stderr (and from stream
# sources that must be read twice). Exceeding it fails the call.
max_buffer = 104857600

# Kill the tool after this many seconds.
# timeout_secs = 30

# Working directory for the tool.
# current_dir = "/tmp"

# Extra environment variables for the tool.
[execution.env]
# MAGICK_MEMORY_LIMIT = "256MB"
"##
}
