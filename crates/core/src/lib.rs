//! medpanel Core
//!
//! Domain types and error types for the medpanel workspace. This crate has
//! no dependency on model providers, HTTP, or the async runtime.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `context` - Run input (`ClinicalContext`, `DocumentAnalysis`)
//! - `finding` - Specialist output contract (`Finding` and its extended blocks)
//! - `builders` - Validated panel configuration (`PanelConfigBuilder`)

pub mod builders;
pub mod context;
pub mod error;
pub mod finding;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Run Input ──────────────────────────────────────────────────────────
pub use context::{ClinicalContext, DocumentAnalysis, HISTORY_UNAVAILABLE};

// ── Findings ───────────────────────────────────────────────────────────
pub use finding::{
    finding_schema, Finding, FindingOrigin, MetricStatus, MonitoringProtocol, RelevantMetric,
    SuggestedMedication, TreatmentPlan, UnavailableReason,
};

// ── Panel Configuration ────────────────────────────────────────────────
pub use builders::{PanelConfig, PanelConfigBuilder};
