//! Services
//!
//! Pipeline stages of a diagnostic run.

pub mod analyzers;
pub mod consolidation;
pub mod fan_out;
pub mod synthesis;
pub mod triage;
pub mod usage;
