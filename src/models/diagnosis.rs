//! Diagnosis Models
//!
//! Result types of a diagnostic run: the per-slot reports of the fan-out,
//! the synthesizer output and the consolidated diagnosis returned to callers.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use medpanel_core::Finding;
use medpanel_llm::StructuredOutput;
use medpanel_quality_gates::{SlotResolution, TerminalState};

use crate::services::analyzers::Specialty;

/// One resolved fan-out slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialistReport {
    pub specialty: Specialty,
    /// Display name of the specialist
    pub specialist: String,
    pub finding: Finding,
    pub resolution: SlotResolution,
}

impl SpecialistReport {
    pub fn new(specialty: Specialty, finding: Finding, resolution: SlotResolution) -> Self {
        Self {
            specialty,
            specialist: specialty.display_name().to_string(),
            finding,
            resolution,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.finding.is_unavailable()
    }
}

/// Ordered results of one fan-out, one entry per dispatched analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FindingSet(Vec<SpecialistReport>);

impl FindingSet {
    pub fn new(reports: Vec<SpecialistReport>) -> Self {
        Self(reports)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SpecialistReport> {
        self.0.iter()
    }

    pub fn reports(&self) -> &[SpecialistReport] {
        &self.0
    }

    pub fn get(&self, specialty: Specialty) -> Option<&SpecialistReport> {
        self.0.iter().find(|r| r.specialty == specialty)
    }

    /// Number of slots holding a model finding.
    pub fn available_count(&self) -> usize {
        self.0.iter().filter(|r| !r.is_unavailable()).count()
    }

    /// Number of slots that ended in `state`.
    pub fn count_terminal(&self, state: TerminalState) -> usize {
        self.0.iter().filter(|r| r.resolution.terminal == state).count()
    }

    pub fn into_inner(self) -> Vec<SpecialistReport> {
        self.0
    }
}

impl<'a> IntoIterator for &'a FindingSet {
    type Item = &'a SpecialistReport;
    type IntoIter = std::slice::Iter<'a, SpecialistReport>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// What the synthesizer model returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisOutput {
    /// Unified diagnosis integrating every specialist's findings
    #[serde(alias = "synthesis")]
    pub diagnosis: String,
    /// Prioritized action plan: next steps, tests and referrals
    #[serde(default)]
    pub suggestions: String,
}

impl StructuredOutput for SynthesisOutput {
    fn check(&self) -> Result<(), String> {
        if self.diagnosis.trim().is_empty() {
            return Err("diagnosis must not be blank".to_string());
        }
        Ok(())
    }
}

/// Clinical priority assigned by urgency triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    /// Immediately life-threatening
    Urgent,
    /// Serious, not immediately life-threatening
    High,
    /// Routine or stable chronic condition
    Normal,
}

impl std::fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrgencyLevel::Urgent => write!(f, "urgent"),
            UrgencyLevel::High => write!(f, "high"),
            UrgencyLevel::Normal => write!(f, "normal"),
        }
    }
}

/// Terminal output of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedDiagnosis {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub diagnosis: String,
    pub suggestions: String,
    pub specialist_findings: FindingSet,
    #[serde(default)]
    pub source_document_ids: Vec<String>,
    /// Patient-facing explanation carried over from document consolidation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_explanation: Option<String>,
    /// Cross-document correlations found during consolidation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlations: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<UrgencyLevel>,
}

impl ConsolidatedDiagnosis {
    pub fn new(synthesis: SynthesisOutput, specialist_findings: FindingSet) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            diagnosis: synthesis.diagnosis,
            suggestions: synthesis.suggestions,
            specialist_findings,
            source_document_ids: Vec::new(),
            patient_explanation: None,
            correlations: None,
            priority: None,
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_source_documents(mut self, ids: Vec<String>) -> Self {
        self.source_document_ids = ids;
        self
    }

    pub fn with_patient_explanation(mut self, explanation: Option<String>) -> Self {
        self.patient_explanation = explanation;
        self
    }

    pub fn with_correlations(mut self, correlations: Option<String>) -> Self {
        self.correlations = correlations;
        self
    }

    pub fn with_priority(mut self, priority: Option<UrgencyLevel>) -> Self {
        self.priority = priority;
        self
    }
}
