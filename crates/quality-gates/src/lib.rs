//! medpanel Quality Gates
//!
//! Second-pass review of specialist findings:
//!
//! - `models` - Verdict taxonomy (`ValidationVerdict`, `ValidationIssue`,
//!   `TerminalState`, `SlotResolution`)
//! - `validator` - `FindingValidator` seam and the model-backed `CriticValidator`
//! - `retry` - `RetryController`, the bounded reject-and-regenerate loop

pub mod models;
pub mod retry;
pub mod validator;

// Re-export verdict types
pub use models::{
    IssueCategory, IssueSeverity, SlotResolution, TerminalState, ValidationIssue,
    ValidationVerdict, DEFAULT_APPROVAL_THRESHOLD,
};

// Re-export retry loop
pub use retry::{RetryController, RetryOutcome, RevisionRequest};

// Re-export validators
pub use validator::{render_finding, CriticReport, CriticValidator, FindingValidator, VALIDATOR_STAGE};
