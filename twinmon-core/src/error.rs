//! Core error types.

use thiserror::Error;

/// Errors from the twin model and the verifier engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid chain definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("invalid guard expression: {reason}")]
    InvalidGuard { reason: String },

    #[error("unsupported operation: {operation}")]
    UnsupportedOperation { operation: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Returns a stable error code suitable for reports and exit diagnostics.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidDefinition { .. } => "BAD_DEFINITION",
            CoreError::InvalidGuard { .. } => "BAD_GUARD",
            CoreError::UnsupportedOperation { .. } => "UNSUPPORTED",
            CoreError::Json(_) => "BAD_REQUEST",
        }
    }
}
