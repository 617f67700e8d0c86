//! Clinical Context
//!
//! Inputs to a diagnostic run:
//!
//! 1. `DocumentAnalysis` - one per source document, produced upstream by the
//!    exam-ingestion step and merged by the pre-consolidator
//! 2. `ClinicalContext` - the immutable, shared input every analyzer reads
//!
//! A `ClinicalContext` is created once per request and handed out as
//! `Arc<ClinicalContext>`; nothing downstream can mutate it.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Text used when no patient history is available for a run.
pub const HISTORY_UNAVAILABLE: &str = "Patient history not available for this analysis.";

// ============================================================================
// ClinicalContext
// ============================================================================

/// Immutable input to one diagnostic run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalContext {
    exam_results_text: String,
    patient_history_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    patient_id: Option<String>,
}

impl ClinicalContext {
    /// Create a context from exam text and patient history.
    ///
    /// A blank history is replaced by [`HISTORY_UNAVAILABLE`] so prompts never
    /// carry an empty section.
    pub fn new(exam_results_text: impl Into<String>, patient_history_text: impl Into<String>) -> Self {
        let history = patient_history_text.into();
        Self {
            exam_results_text: exam_results_text.into(),
            patient_history_text: if history.trim().is_empty() {
                HISTORY_UNAVAILABLE.to_string()
            } else {
                history
            },
            patient_id: None,
        }
    }

    /// Attach the opaque patient identifier used for usage accounting.
    pub fn with_patient_id(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    /// Reject contexts with no exam text to analyze.
    pub fn validate(&self) -> CoreResult<()> {
        if self.exam_results_text.trim().is_empty() {
            return Err(CoreError::validation("exam results text must not be empty"));
        }
        Ok(())
    }

    pub fn exam_results_text(&self) -> &str {
        &self.exam_results_text
    }

    pub fn patient_history_text(&self) -> &str {
        &self.patient_history_text
    }

    pub fn patient_id(&self) -> Option<&str> {
        self.patient_id.as_deref()
    }

    /// Render the context as the data block appended to every prompt.
    pub fn to_prompt_block(&self) -> String {
        format!(
            "## Exam Results\n{}\n\n## Patient History\n{}",
            self.exam_results_text.trim(),
            self.patient_history_text.trim()
        )
    }
}

// ============================================================================
// DocumentAnalysis
// ============================================================================

/// Per-document analysis produced before consolidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnalysis {
    /// Stable identifier of the source document (exam id)
    pub document_id: String,
    /// Original file name, for prompt labelling only
    pub file_name: String,
    /// Document type (lab panel, imaging report, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    /// Summary in medical terminology
    pub medical_summary: String,
    /// Plain-language explanation for the patient
    pub patient_explanation: String,
}

impl DocumentAnalysis {
    pub fn new(
        document_id: impl Into<String>,
        file_name: impl Into<String>,
        medical_summary: impl Into<String>,
        patient_explanation: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            file_name: file_name.into(),
            document_type: None,
            medical_summary: medical_summary.into(),
            patient_explanation: patient_explanation.into(),
        }
    }

    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = Some(document_type.into());
        self
    }
}
