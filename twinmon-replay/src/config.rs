//! Replay configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via `--config` or TWINMON_CONFIG)
//! 3. Environment variables
//!
//! ```yaml
//! replay:
//!   input: logs/house.jsonl
//!   timestamp_sentinel: -1
//!   show_state: true
//! monitors:
//!   - name: door-then-motion
//!     kind: chain
//!     steps:
//!       - guard: event.sensor == "door" && event.state == "OPEN"
//!       - guard: event.sensor == "motion" && event.state == "ON"
//!   - name: no-motion-while-dark
//!     kind: invariant
//!     guard: '!(house.hall."".pir.motion == "ON" && house.hall."".lux.level < 10)'
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use twinmon_core::StepRaw;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "TWINMON_CONFIG";

/// Replay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input/output settings.
    pub replay: ReplayConfig,
    /// Monitored properties, in output order.
    pub monitors: Vec<MonitorConfig>,
}

impl Config {
    /// Loads configuration from `path` (or TWINMON_CONFIG), then applies
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var(CONFIG_ENV) {
                Ok(path) => Self::from_file(&path)?,
                Err(_) => Self::default(),
            },
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::ParseError(_, msg) => ConfigError::ParseError(path.to_path_buf(), msg),
            other => other,
        })
    }

    /// Parses configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content)
            .map_err(|e| ConfigError::ParseError(PathBuf::from("<inline>"), e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        self.replay.apply_env_overrides();
    }

    /// Checks monitor names are present, unique and free of control
    /// characters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for monitor in &self.monitors {
            let name = monitor.name();
            if name.is_empty() {
                return Err(ConfigError::ValidationError(
                    "monitor name must not be empty".to_string(),
                ));
            }
            // Names are the first column of tab-separated verdict lines.
            if name.chars().any(char::is_control) {
                return Err(ConfigError::ValidationError(format!(
                    "monitor name {:?} must not contain control characters",
                    name
                )));
            }
            if !seen.insert(name) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate monitor name '{}'",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// How the final house snapshot is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateFormat {
    /// Nested tables with freshness highlighting.
    #[default]
    Table,
    /// Pretty-printed JSON.
    Json,
}

/// Input/output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// JSON-lines event log (stdin when unset).
    pub input: Option<PathBuf>,
    /// Verdict output file (stdout when unset).
    pub output: Option<PathBuf>,
    /// Timestamp stored for events whose timestamp cannot be parsed.
    pub timestamp_sentinel: i64,
    /// Print the final house snapshot.
    pub show_state: bool,
    /// Snapshot format.
    pub state_format: StateFormat,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            timestamp_sentinel: -1,
            show_state: false,
            state_format: StateFormat::Table,
        }
    }
}

impl ReplayConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TWINMON_INPUT") {
            self.input = Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("TWINMON_OUTPUT") {
            self.output = Some(PathBuf::from(path));
        }

        if let Ok(sentinel) = std::env::var("TWINMON_TIMESTAMP_SENTINEL") {
            if let Ok(n) = sentinel.parse() {
                self.timestamp_sentinel = n;
            }
        }

        if let Ok(show) = std::env::var("TWINMON_SHOW_STATE") {
            self.show_state = show == "1" || show.to_lowercase() == "true";
        }
    }
}

/// One monitored property.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MonitorConfig {
    /// Ordered same-tick chain over events.
    Chain {
        name: String,
        steps: Vec<StepRaw>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<serde_json::Value>,
    },
    /// Guard over `house.*` fields that must hold after every event.
    Invariant { name: String, guard: String },
}

impl MonitorConfig {
    pub fn name(&self) -> &str {
        match self {
            MonitorConfig::Chain { name, .. } | MonitorConfig::Invariant { name, .. } => name,
        }
    }
}
