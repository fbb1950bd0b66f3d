//! Configuration loading, validation, and management for refwindow.
//!
//! Loads configuration from `~/.refwindow/config.toml` (or the file named by
//! `REFWINDOW_CONFIG`) with environment variable overrides. Validates all
//! settings at load time.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// History compilation settings for one model.
///
/// Maps directly to `~/.refwindow/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Model input token limit
    #[serde(default = "default_input_token_limit")]
    pub input_token_limit: usize,

    /// Fraction of the input limit held back for encoder undercount and
    /// the response
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,

    /// Multiplier applied to the overshoot when the cut is already large
    #[serde(default = "default_reduction_margin")]
    pub reduction_margin: f64,

    /// Divisor at or above which `reduction_margin` is applied
    #[serde(default = "default_aggressive_threshold")]
    pub aggressive_threshold: f64,

    /// Token window for stored history (defaults to the effective budget)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_token_limit: Option<usize>,

    /// Upper bound on reduction passes per turn
    #[serde(default = "default_max_reduction_passes")]
    pub max_reduction_passes: usize,

    /// Tool message text used when a call keeps no sources
    #[serde(default = "default_no_sources_text")]
    pub no_sources_text: String,

    /// Tools whose result is one structured payload rather than a chunk list
    #[serde(default = "default_structured_tools")]
    pub structured_tools: Vec<String>,
}

fn default_input_token_limit() -> usize {
    128_000
}
fn default_safety_margin() -> f64 {
    0.1
}
fn default_reduction_margin() -> f64 {
    0.9
}
fn default_aggressive_threshold() -> f64 {
    1.2
}
fn default_max_reduction_passes() -> usize {
    64
}
fn default_no_sources_text() -> String {
    "No relevant sources found.".into()
}
fn default_structured_tools() -> Vec<String> {
    vec!["table_query".into()]
}

impl ContextConfig {
    /// Load configuration from the default location.
    ///
    /// Priority:
    /// 1. File named by `REFWINDOW_CONFIG`
    /// 2. `~/.refwindow/config.toml`
    /// 3. Built-in defaults
    ///
    /// Environment overrides are applied last.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("REFWINDOW_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `REFWINDOW_INPUT_TOKEN_LIMIT` / `REFWINDOW_SAFETY_MARGIN`.
    fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(raw) = lookup("REFWINDOW_INPUT_TOKEN_LIMIT") {
            self.input_token_limit = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "REFWINDOW_INPUT_TOKEN_LIMIT must be an integer, got '{raw}'"
                ))
            })?;
        }
        if let Some(raw) = lookup("REFWINDOW_SAFETY_MARGIN") {
            self.safety_margin = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "REFWINDOW_SAFETY_MARGIN must be a number, got '{raw}'"
                ))
            })?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".refwindow")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_token_limit == 0 {
            return Err(ConfigError::ValidationError(
                "input_token_limit must be > 0".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.safety_margin) {
            return Err(ConfigError::ValidationError(
                "safety_margin must be in [0.0, 1.0)".into(),
            ));
        }
        if !(self.reduction_margin > 0.0 && self.reduction_margin <= 1.0) {
            return Err(ConfigError::ValidationError(
                "reduction_margin must be in (0.0, 1.0]".into(),
            ));
        }
        if !(self.aggressive_threshold >= 1.0) {
            return Err(ConfigError::ValidationError(
                "aggressive_threshold must be >= 1.0".into(),
            ));
        }
        if self.max_reduction_passes == 0 {
            return Err(ConfigError::ValidationError(
                "max_reduction_passes must be >= 1".into(),
            ));
        }
        if self.history_token_limit == Some(0) {
            return Err(ConfigError::ValidationError(
                "history_token_limit must be > 0 when set".into(),
            ));
        }
        Ok(())
    }

    /// Token ceiling after reserving the safety margin:
    /// `floor(input_token_limit × (1 − safety_margin))`.
    pub fn effective_budget(&self) -> usize {
        effective_budget(self.input_token_limit, self.safety_margin)
    }

    /// Token window applied to stored history before assembly.
    pub fn history_window(&self) -> usize {
        self.history_token_limit
            .unwrap_or_else(|| self.effective_budget())
    }

    /// Whether `tool_name` returns a single structured payload.
    pub fn is_structured_tool(&self, tool_name: &str) -> bool {
        self.structured_tools.iter().any(|t| t == tool_name)
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// `floor(input_limit × (1 − margin))`.
pub fn effective_budget(input_limit: usize, margin: f64) -> usize {
    (input_limit as f64 * (1.0 - margin)).floor() as usize
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            input_token_limit: default_input_token_limit(),
            safety_margin: default_safety_margin(),
            reduction_margin: default_reduction_margin(),
            aggressive_threshold: default_aggressive_threshold(),
            history_token_limit: None,
            max_reduction_passes: default_max_reduction_passes(),
            no_sources_text: default_no_sources_text(),
            structured_tools: default_structured_tools(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
