//! Error Handling
//!
//! Request-level error type for the diagnostic engine.
//!
//! Infrastructure failures inside a run (analyzer timeouts, malformed model
//! output, validator errors) never surface here; they become placeholder
//! findings or fail-open verdicts. What does surface is what makes a report
//! impossible: a failed synthesis, caller cancellation, bad configuration,
//! or no input documents.

use thiserror::Error;

use medpanel_core::CoreError;
use medpanel_llm::LlmError;

/// Engine-wide error type
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Domain validation errors from the core crate
    #[error(transparent)]
    Core(#[from] CoreError),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file parse errors
    #[error("Settings parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Pre-consolidation was given nothing to merge
    #[error("No documents to analyze")]
    NoDocuments,

    /// The final synthesis call failed; no report can be produced
    #[error("Synthesis failed: {0}")]
    Synthesis(#[source] LlmError),

    /// The caller cancelled the run
    #[error("Diagnostic run cancelled")]
    Cancelled,

    /// Tracing subscriber installation errors
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for engine errors
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a telemetry error
    pub fn telemetry(msg: impl Into<String>) -> Self {
        Self::Telemetry(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error came from the caller cancelling the run
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}
