//! Finding Types
//!
//! The structured result of one specialist analyzer. `Finding` doubles as the
//! analyzers' output contract: its JSON schema (via `schemars`) is what every
//! specialist call is constrained to, and serde deserialization plus
//! [`Finding::check_contract`] is how a model response is accepted.
//!
//! `origin` is not part of the contract. Model output always deserializes as
//! [`FindingOrigin::Model`]; placeholders built by [`Finding::unavailable`]
//! carry [`FindingOrigin::Unavailable`] so a missing analysis can never be
//! mistaken for a negative one.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

// ============================================================================
// Extended blocks
// ============================================================================

/// A suggested medication with complete dosing information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedMedication {
    /// Active ingredient, and brand name when applicable
    pub medication: String,
    /// Specific dose, e.g. "50mg" or "10mg/kg"
    pub dosage: String,
    /// Administration frequency, e.g. "once daily", "every 12h"
    pub frequency: String,
    /// Treatment duration, e.g. "7 days", "continuous"
    pub duration: String,
    /// Route, e.g. "oral", "intravenous", "topical"
    pub route: String,
    /// Clinical justification tied to a specific finding
    pub justification: String,
}

/// Treatment plan for the specialty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentPlan {
    /// Main recommended treatment (pharmacological or not)
    pub primary_treatment: String,
    /// Supportive and complementary care
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supportive_care: Option<String>,
    /// Specific lifestyle modifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifestyle_modifications: Option<String>,
    /// Expected prognosis under the proposed treatment
    pub expected_outcome: String,
}

/// Post-treatment monitoring protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringProtocol {
    /// Parameters to monitor (blood pressure, glucose, renal function, ...)
    pub parameters: String,
    /// Monitoring frequency
    pub frequency: String,
    /// Signals that require immediate medical attention
    pub warning_signals: String,
}

/// Clinical significance of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    Normal,
    Borderline,
    Abnormal,
    Critical,
}

/// A key clinical metric and its interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelevantMetric {
    /// Name of the metric, e.g. "Blood Pressure", "ECG QT Interval"
    pub metric: String,
    /// Observed value or description
    pub value: String,
    /// Clinical significance
    pub status: MetricStatus,
    /// What the value means clinically
    pub interpretation: String,
}

// ============================================================================
// Origin
// ============================================================================

/// Why an analyzer slot holds a placeholder instead of a model finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// The model call exceeded its timeout
    Timeout,
    /// Network, authentication, rate limit or provider error
    Transport,
    /// The response did not satisfy the output contract
    ContractViolation,
    /// The model returned nothing
    EmptyResponse,
    /// The run was cancelled or its fan-out deadline passed
    Cancelled,
    /// The slot's task aborted (panic)
    TaskFailed,
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnavailableReason::Timeout => write!(f, "timeout"),
            UnavailableReason::Transport => write!(f, "transport"),
            UnavailableReason::ContractViolation => write!(f, "contract_violation"),
            UnavailableReason::EmptyResponse => write!(f, "empty_response"),
            UnavailableReason::Cancelled => write!(f, "cancelled"),
            UnavailableReason::TaskFailed => write!(f, "task_failed"),
        }
    }
}

/// Where a finding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingOrigin {
    /// Produced by the model and accepted against the contract
    #[default]
    Model,
    /// Deterministic placeholder; manual review required
    Unavailable { reason: UnavailableReason },
}

// ============================================================================
// Finding
// ============================================================================

/// Structured result of one specialist analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Detailed clinical findings. Must address every abnormal value with its
    /// clinical significance.
    pub findings: String,
    /// Severity and urgency: normal, mild, moderate, severe, critical or not applicable
    pub clinical_assessment: String,
    /// Follow-up, additional tests or immediate actions within the specialty
    pub recommendations: String,
    /// Suggested medications with specific dosing. Empty when none are indicated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_medications: Vec<SuggestedMedication>,
    /// Detailed treatment plan, when applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment_plan: Option<TreatmentPlan>,
    /// Monitoring protocol, when applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring_protocol: Option<MonitoringProtocol>,
    /// Contraindications related to the suggested treatments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contraindications: Vec<String>,
    /// Key clinical metrics and their status
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relevant_metrics: Vec<RelevantMetric>,
    #[serde(default)]
    #[schemars(skip)]
    pub origin: FindingOrigin,
}

impl Finding {
    /// Create a model finding with only the required fields.
    pub fn new(
        findings: impl Into<String>,
        clinical_assessment: impl Into<String>,
        recommendations: impl Into<String>,
    ) -> Self {
        Self {
            findings: findings.into(),
            clinical_assessment: clinical_assessment.into(),
            recommendations: recommendations.into(),
            suggested_medications: Vec::new(),
            treatment_plan: None,
            monitoring_protocol: None,
            contraindications: Vec::new(),
            relevant_metrics: Vec::new(),
            origin: FindingOrigin::Model,
        }
    }

    /// The deterministic placeholder for a specialty whose analysis failed.
    ///
    /// Identical inputs always produce identical placeholders.
    pub fn unavailable(specialist: &str, reason: UnavailableReason) -> Self {
        Self {
            findings: format!(
                "ANALYSIS UNAVAILABLE: no structured {specialist} analysis could be produced \
                 for this case ({reason}). This is not a negative finding."
            ),
            clinical_assessment: "Not assessed - manual clinical review required".to_string(),
            recommendations: format!(
                "Manual review of the exam results by a {specialist} is required before \
                 acting on this report."
            ),
            origin: FindingOrigin::Unavailable { reason },
            ..Self::new("", "", "")
        }
    }

    /// Whether this finding is a placeholder.
    pub fn is_unavailable(&self) -> bool {
        matches!(self.origin, FindingOrigin::Unavailable { .. })
    }

    /// Reason for the placeholder, if this is one.
    pub fn unavailable_reason(&self) -> Option<UnavailableReason> {
        match self.origin {
            FindingOrigin::Unavailable { reason } => Some(reason),
            FindingOrigin::Model => None,
        }
    }

    /// Check the parts of the output contract serde cannot express: required
    /// text fields must carry content.
    pub fn check_contract(&self) -> CoreResult<()> {
        let required = [
            ("findings", &self.findings),
            ("clinicalAssessment", &self.clinical_assessment),
            ("recommendations", &self.recommendations),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(CoreError::contract(format!("{name} must not be blank")));
            }
        }
        if let Some(med) = self
            .suggested_medications
            .iter()
            .find(|m| m.medication.trim().is_empty())
        {
            return Err(CoreError::contract(format!(
                "suggested medication without a name (dosage '{}')",
                med.dosage
            )));
        }
        Ok(())
    }
}

/// JSON schema of the analyzer output contract.
pub fn finding_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(Finding)).unwrap_or(serde_json::Value::Null)
}
