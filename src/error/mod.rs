//! Unified error handling for authstack

use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors raised while assembling or synthesizing a stack
#[derive(Error, Debug)]
pub enum AppError {
    /// A declared parameter violates a documented constraint
    #[error("Validation error: {0}")]
    Validation(String),

    /// Two siblings registered under the same construct id
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The assembled graph cannot be turned into a template
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Validation error tagged with the offending field
    pub fn invalid(field: &str, message: impl std::fmt::Display) -> Self {
        AppError::Validation(format!("{}: {}", field, message))
    }
}

// Conversion from validation errors
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}
