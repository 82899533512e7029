//! Replay error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a replay.
///
/// Per-record problems never surface here; malformed lines are skipped and
/// counted by the event source instead.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("core error: {0}")]
    Core(#[from] twinmon_core::CoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open '{}': {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReplayError {
    /// Short machine-readable code, reused from the core for core errors.
    pub fn error_code(&self) -> &'static str {
        match self {
            ReplayError::Io(_) | ReplayError::Open { .. } => "IO_ERROR",
            ReplayError::Json(_) => "BAD_REQUEST",
            ReplayError::Core(e) => e.error_code(),
            ReplayError::Config(_) => "BAD_CONFIG",
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    IoError(PathBuf, std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    ParseError(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}
