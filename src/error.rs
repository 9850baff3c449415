//! Error types for Clickstream Flux
//!
//! Only boundary failures are errors. Per-record data problems are reported as
//! [`crate::cleaner::Rejection`] values and never surface here.

use thiserror::Error;

/// Errors that can abort a run
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Failed to write dataset {dataset}: {message}")]
    OutputError { dataset: String, message: String },
}
