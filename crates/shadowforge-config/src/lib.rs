//! Configuration system for ShadowForge.
//!
//! Load engine configuration from TOML or YAML files to switch assertion
//! modes and propagation tracing without code changes.
//!
//! # Examples
//!
//! Load configuration from a TOML string:
//!
//! ```
//! use shadowforge_config::{EngineConfig, EnvironmentMode};
//!
//! let config = EngineConfig::from_toml_str(r#"
//!     environment_mode = "full_assert"
//!
//!     [propagation]
//!     queue_capacity = 256
//!     trace_commits = true
//!
//!     [session]
//!     report_decision_changes = false
//! "#).unwrap();
//!
//! assert_eq!(config.environment_mode, EnvironmentMode::FullAssert);
//! assert_eq!(config.propagation.queue_capacity, 256);
//! assert!(!config.session.report_decision_changes);
//! ```
//!
//! Use the default config when the file is missing:
//!
//! ```
//! use shadowforge_config::EngineConfig;
//!
//! let config = EngineConfig::load("shadowforge.toml").unwrap_or_default();
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// How much self-checking runs after every edit session.
    #[serde(default)]
    pub environment_mode: EnvironmentMode,

    #[serde(default)]
    pub propagation: PropagationConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

impl EngineConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file; `.yaml`/`.yml` are read as YAML,
    /// anything else as TOML.
    ///
    /// # Errors
    ///
    /// Returns error if the file doesn't exist, fails to parse or holds
    /// invalid values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_file(path),
            _ => Self::from_toml_file(path),
        }
    }

    /// Loads configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot reject on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.propagation.queue_capacity > PropagationConfig::MAX_QUEUE_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "propagation.queue_capacity {} exceeds {}",
                self.propagation.queue_capacity,
                PropagationConfig::MAX_QUEUE_CAPACITY
            )));
        }
        Ok(())
    }

    /// Sets the environment mode.
    pub fn with_environment_mode(mut self, mode: EnvironmentMode) -> Self {
        self.environment_mode = mode;
        self
    }

    /// Sets the initial capacity of the propagation queue.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.propagation.queue_capacity = capacity;
        self
    }

    /// Emits a trace event for every committed derived value.
    pub fn with_trace_commits(mut self, enabled: bool) -> Self {
        self.propagation.trace_commits = enabled;
        self
    }

    /// Includes or omits decision changes from edit results.
    pub fn with_decision_changes(mut self, report: bool) -> Self {
        self.session.report_decision_changes = report;
        self
    }

    /// Returns true if inverse mirrors are checked after every edit.
    pub fn checks_mirrors(&self) -> bool {
        self.environment_mode != EnvironmentMode::NoAssert
    }

    /// Returns true if derived values are compared against a full recomputation.
    pub fn checks_derivations(&self) -> bool {
        self.environment_mode == EnvironmentMode::FullAssert
    }
}

/// Environment mode affecting the amount of self-checking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentMode {
    /// No checks beyond argument validation.
    #[default]
    NoAssert,

    /// Verify inverse mirrors against relation values after each edit.
    FastAssert,

    /// Also verify every derived value against a from-scratch derivation.
    FullAssert,
}

/// Propagation queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", default)]
pub struct PropagationConfig {
    /// Initial capacity of the work queue and pending set.
    pub queue_capacity: usize,

    /// Emit a `commit` trace event per changed derived value.
    pub trace_commits: bool,
}

impl PropagationConfig {
    pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
    pub const MAX_QUEUE_CAPACITY: usize = 1 << 24;
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: Self::DEFAULT_QUEUE_CAPACITY,
            trace_commits: false,
        }
    }
}

/// Edit session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", default)]
pub struct SessionConfig {
    /// Report decision attribute writes alongside derived changes.
    pub report_decision_changes: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            report_decision_changes: true,
        }
    }
}

#[cfg(test)]
mod tests;
