//! Multi-Document Pre-Consolidator
//!
//! Merges per-document analyses into the single narrative the panel runs
//! on. One document passes straight through without a model call; several
//! documents are merged by one consolidation call, or, if that call fails,
//! by a delimited concatenation so the run can continue.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use medpanel_core::DocumentAnalysis;
use medpanel_llm::{StructuredInvoker, StructuredOutput, StructuredRequest};

use crate::utils::error::{EngineError, EngineResult};

/// Usage stage tag for consolidation calls.
pub const CONSOLIDATION_STAGE: &str = "consolidation";

const CONSOLIDATION_SYSTEM_PROMPT: &str = "\
You are a medical AI assistant. You received analyses of several exam \
documents that were processed individually. Create ONE unified, \
comprehensive analysis that integrates all of them.

- Combine every medical finding into one cohesive summary in medical terminology.
- Identify correlations or patterns across the different exams.
- Write one patient-friendly explanation covering all exams, simple and empathetic.
- Do not just concatenate: synthesize and integrate the information.
- Highlight important connections between results of different exams.";

/// What the consolidation model returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationOutput {
    /// Unified comprehensive summary of all exam results, in medical terminology
    pub unified_summary: String,
    /// Unified simple, empathetic explanation for the patient
    pub unified_patient_explanation: String,
    /// Correlations or patterns identified across the exams
    #[serde(default)]
    pub correlations: Option<String>,
}

impl StructuredOutput for ConsolidationOutput {
    fn check(&self) -> Result<(), String> {
        if self.unified_summary.trim().is_empty() {
            return Err("unifiedSummary must not be blank".to_string());
        }
        Ok(())
    }
}

/// How the documents were merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationMode {
    SingleDocument,
    Model,
    Concatenated,
}

/// Input to the panel after consolidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedInput {
    pub exam_results_text: String,
    pub patient_explanation: Option<String>,
    pub correlations: Option<String>,
    pub document_ids: Vec<String>,
    pub mode: ConsolidationMode,
}

/// Merges document analyses before fan-out.
#[derive(Clone)]
pub struct PreConsolidator {
    invoker: StructuredInvoker,
    timeout: Duration,
}

impl PreConsolidator {
    pub fn new(invoker: StructuredInvoker, timeout: Duration) -> Self {
        Self { invoker, timeout }
    }

    pub async fn consolidate(&self, documents: &[DocumentAnalysis]) -> EngineResult<ConsolidatedInput> {
        let document_ids: Vec<String> = documents.iter().map(|d| d.document_id.clone()).collect();

        let first = match documents {
            [] => return Err(EngineError::NoDocuments),
            [single] => {
                info!(document = %single.document_id, "Single document, skipping consolidation");
                return Ok(ConsolidatedInput {
                    exam_results_text: single.medical_summary.clone(),
                    patient_explanation: Some(single.patient_explanation.clone())
                        .filter(|text| !text.trim().is_empty()),
                    correlations: None,
                    document_ids,
                    mode: ConsolidationMode::SingleDocument,
                });
            }
            [first, ..] => first,
        };

        info!(documents = documents.len(), "Consolidating document analyses");
        let request = StructuredRequest::new(
            CONSOLIDATION_STAGE,
            CONSOLIDATION_SYSTEM_PROMPT,
            build_prompt(documents),
            self.timeout,
        );

        match self.invoker.call::<ConsolidationOutput>(request).await {
            Ok(output) => Ok(ConsolidatedInput {
                exam_results_text: output.unified_summary,
                patient_explanation: Some(output.unified_patient_explanation)
                    .filter(|s| !s.trim().is_empty()),
                correlations: output.correlations.filter(|s| !s.trim().is_empty()),
                document_ids,
                mode: ConsolidationMode::Model,
            }),
            Err(e) => {
                warn!(
                    documents = documents.len(),
                    first = %first.document_id,
                    "Consolidation call failed, concatenating summaries: {}",
                    e
                );
                Ok(concatenate(documents, document_ids))
            }
        }
    }
}

fn document_heading(index: usize, total: usize, doc: &DocumentAnalysis) -> String {
    match &doc.document_type {
        Some(kind) => format!("Document {}/{}: {} ({})", index + 1, total, doc.file_name, kind),
        None => format!("Document {}/{}: {}", index + 1, total, doc.file_name),
    }
}

fn build_prompt(documents: &[DocumentAnalysis]) -> String {
    let total = documents.len();
    let mut prompt = String::from("Individual document analyses:\n");
    for (i, doc) in documents.iter().enumerate() {
        prompt.push_str(&format!(
            "\n---\n{}\nMedical summary: {}\nPatient explanation: {}\n---\n",
            document_heading(i, total, doc),
            doc.medical_summary.trim(),
            doc.patient_explanation.trim()
        ));
    }
    prompt
}

/// Deterministic merge used when the consolidation call fails.
fn concatenate(documents: &[DocumentAnalysis], document_ids: Vec<String>) -> ConsolidatedInput {
    let total = documents.len();
    let summaries: Vec<String> = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            format!(
                "=== {} ===\n{}",
                document_heading(i, total, doc),
                doc.medical_summary.trim()
            )
        })
        .collect();
    let explanations: Vec<&str> = documents
        .iter()
        .map(|d| d.patient_explanation.trim())
        .filter(|s| !s.is_empty())
        .collect();

    ConsolidatedInput {
        exam_results_text: summaries.join("\n\n"),
        patient_explanation: (!explanations.is_empty()).then(|| explanations.join("\n\n")),
        correlations: None,
        document_ids,
        mode: ConsolidationMode::Concatenated,
    }
}
