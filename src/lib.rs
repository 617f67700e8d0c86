//! medpanel - Multi-Specialist Diagnostic Engine
//!
//! Runs a patient's exam results and history past a panel of specialist
//! analyzers, each backed by a structured model call. It includes:
//! - Analyzer pool, invocation and fallback placeholders
//! - Concurrent fan-out with per-slot quality review and bounded retries
//! - Multi-document pre-consolidation, final synthesis and triage
//! - Usage and cost reporting, settings loading and tracing setup

pub mod config;
pub mod engine;
pub mod models;
pub mod services;
pub mod telemetry;
pub mod utils;

pub use config::EngineSettings;
pub use engine::{DiagnosticEngine, DiagnosticEngineBuilder, PanelSelection};
pub use models::{ConsolidatedDiagnosis, FindingSet, SpecialistReport, SynthesisOutput, UrgencyLevel};
pub use services::analyzers::{AnalyzerDescriptor, AnalyzerPool, Specialty};
pub use services::usage::{MemoryUsageSink, UsageRecord, UsageSink, UsageTracker};
pub use telemetry::init_tracing;
pub use utils::error::{EngineError, EngineResult};

// Workspace crates, re-exported for callers
pub use medpanel_core::{ClinicalContext, DocumentAnalysis, Finding, PanelConfig, PanelConfigBuilder};
pub use medpanel_llm::{LlmProvider, ProviderConfig};
pub use tokio_util::sync::CancellationToken;
