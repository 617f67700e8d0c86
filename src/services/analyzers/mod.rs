//! Specialist Analyzers
//!
//! The closed set of specialties, their static descriptors and the single
//! generic invocation path every analyzer goes through.

mod invocation;
mod pool;
mod specialty;
pub mod templates;

pub use invocation::{build_prompt, invoke, unavailable_reason, ANALYZER_STAGE};
pub use pool::{AnalyzerDescriptor, AnalyzerPool};
pub use specialty::Specialty;
