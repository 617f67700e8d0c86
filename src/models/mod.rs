//! Data Models
//!
//! Result types produced by the diagnostic engine.

pub mod diagnosis;

pub use diagnosis::*;
