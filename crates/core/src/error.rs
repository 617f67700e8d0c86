//! Core Error Types
//!
//! Errors raised by the shared data types: invalid clinical input, invalid
//! panel limits, and findings that break the analyzer output contract.
//!
//! The engine crate wraps these and adds request-level variants (synthesis
//! failure, cancellation, settings I/O).

use thiserror::Error;

/// Core error type for the medpanel workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Rejected input or configuration value
    #[error("Validation error: {0}")]
    Validation(String),

    /// A finding that parsed but breaks the output contract
    #[error("Contract violation: {0}")]
    Contract(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn contract(msg: impl Into<String>) -> Self {
        Self::Contract(msg.into())
    }
}
