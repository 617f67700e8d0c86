//! Usage Reporting
//!
//! Token and cost accounting for every model call of a run.

mod cost_calculator;
mod tracker;

pub use cost_calculator::*;
pub use tracker::*;
