//! Finding Validators
//!
//! `FindingValidator` is the seam between the retry loop and whatever judges
//! a finding. [`CriticValidator`] is the model-backed implementation: a
//! senior-reviewer prompt scoring five weighted criteria
//! (completeness 30, evidentiary grounding 25, recommendation specificity 20,
//! prescription quality 15, internal coherence 10).
//!
//! Validators report their own failures through `review`; callers use
//! `validate`, which turns any failure into a fail-open approval.

use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};

use medpanel_core::{ClinicalContext, Finding};
use medpanel_llm::{LlmResult, StructuredInvoker, StructuredOutput, StructuredRequest};

use crate::models::{ValidationIssue, ValidationVerdict, DEFAULT_APPROVAL_THRESHOLD};

/// Usage stage tag for critic calls.
pub const VALIDATOR_STAGE: &str = "validator";

/// Judges one finding against the context it was produced from.
#[async_trait]
pub trait FindingValidator: Send + Sync {
    /// Produce a verdict, or the reason no verdict could be produced.
    async fn review(
        &self,
        specialist: &str,
        context: &ClinicalContext,
        finding: &Finding,
    ) -> LlmResult<ValidationVerdict>;

    /// Like `review`, but never fails: a validator error yields a fail-open
    /// approval.
    async fn validate(
        &self,
        specialist: &str,
        context: &ClinicalContext,
        finding: &Finding,
    ) -> ValidationVerdict {
        match self.review(specialist, context, finding).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(specialty = specialist, "Validator failed, accepting finding unreviewed: {}", e);
                ValidationVerdict::fail_open(e)
            }
        }
    }
}

// ============================================================================
// Critic output contract
// ============================================================================

/// What the critic model is asked to return.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CriticReport {
    /// Quality score of the analysis, 0-100
    pub validation_score: u32,
    /// Problems found in the analysis (empty if none)
    #[serde(default)]
    pub issues: Vec<ValidationIssue>,
    /// Detailed, actionable feedback for the specialist (empty if approved)
    #[serde(default)]
    pub feedback: String,
    /// Whether the critic would approve the analysis. Informational only.
    #[serde(default)]
    pub approved_response: Option<bool>,
}

impl StructuredOutput for CriticReport {
    fn check(&self) -> Result<(), String> {
        if self.validation_score > 100 {
            return Err(format!(
                "validationScore must be within 0..=100, got {}",
                self.validation_score
            ));
        }
        Ok(())
    }
}

// ============================================================================
// CriticValidator
// ============================================================================

const CRITIC_SYSTEM_PROMPT: &str = "\
You are a senior medical auditor reviewing a specialist's analysis before it \
reaches the coordinating physician. Be rigorous but constructive.

Score the analysis from 0 to 100 using these weighted criteria:

1. Completeness (30): every abnormal exam value relevant to the specialty is \
mentioned and interpreted, with its numeric value cited.
2. Evidentiary grounding (25): every claim is tied to a value in the exam data \
or the history; nothing is invented.
3. Recommendation specificity (20): actions are concrete, with timelines and \
exact dosing.
4. Prescription quality (15): medications carry name, dose, route, frequency, \
duration and a justification tied to a finding; contraindications are considered.
5. Internal coherence (10): the severity assessment matches the findings and \
the recommendations are proportional to it.

Score bands: 90-100 excellent, 75-89 good, 60-74 insufficient, 0-59 inadequate.

Report each problem with a category (missing_data_analysis, generic_response, \
unsupported_claim, incomplete_recommendations, medication_issues, other), a \
severity (critical: could harm the patient or cause a wrong diagnosis; major: \
compromises the usefulness of the analysis; minor: desirable improvement), a \
description and a specific suggestion.

When the analysis falls short, the feedback must say exactly what to fix, \
e.g. \"You mention hypertension but not the measured value (150/95 mmHg); cite it.\"";

/// Model-backed critic.
pub struct CriticValidator {
    invoker: StructuredInvoker,
    threshold: u8,
    timeout: Duration,
}

impl CriticValidator {
    pub fn new(invoker: StructuredInvoker, timeout: Duration) -> Self {
        Self {
            invoker,
            threshold: DEFAULT_APPROVAL_THRESHOLD,
            timeout,
        }
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    fn build_prompt(specialist: &str, context: &ClinicalContext, finding: &Finding) -> String {
        format!(
            "# Specialist under review\n{}\n\n# Data given to the specialist\n{}\n\n\
             # Analysis to validate\n{}",
            specialist,
            context.to_prompt_block(),
            render_finding(finding)
        )
    }
}

#[async_trait]
impl FindingValidator for CriticValidator {
    async fn review(
        &self,
        specialist: &str,
        context: &ClinicalContext,
        finding: &Finding,
    ) -> LlmResult<ValidationVerdict> {
        let request = StructuredRequest::new(
            VALIDATOR_STAGE,
            CRITIC_SYSTEM_PROMPT,
            Self::build_prompt(specialist, context, finding),
            self.timeout,
        )
        .with_subject(specialist);

        let report: CriticReport = self.invoker.call(request).await?;
        let verdict = ValidationVerdict::scored(
            report.validation_score as u8,
            self.threshold,
            report.issues,
            report.feedback,
        );

        if report.approved_response.is_some_and(|flag| flag != verdict.approved) {
            info!(
                specialty = specialist,
                score = verdict.score,
                "Critic approval flag disagrees with its score; using the score"
            );
        }
        Ok(verdict)
    }
}

/// Render a finding, extended blocks included, as prompt text.
pub fn render_finding(finding: &Finding) -> String {
    let mut out = format!(
        "## Clinical findings\n{}\n\n## Severity assessment\n{}\n\n## Recommendations\n{}\n",
        finding.findings, finding.clinical_assessment, finding.recommendations
    );

    if !finding.suggested_medications.is_empty() {
        out.push_str("\n## Suggested medications\n");
        for med in &finding.suggested_medications {
            out.push_str(&format!(
                "- {}: {} {} for {} ({})\n  Justification: {}\n",
                med.medication, med.dosage, med.frequency, med.duration, med.route, med.justification
            ));
        }
    }

    if let Some(plan) = &finding.treatment_plan {
        out.push_str(&format!("\n## Treatment plan\nPrimary: {}\n", plan.primary_treatment));
        if let Some(care) = &plan.supportive_care {
            out.push_str(&format!("Supportive care: {}\n", care));
        }
        if let Some(lifestyle) = &plan.lifestyle_modifications {
            out.push_str(&format!("Lifestyle: {}\n", lifestyle));
        }
        out.push_str(&format!("Expected outcome: {}\n", plan.expected_outcome));
    }

    if let Some(monitoring) = &finding.monitoring_protocol {
        out.push_str(&format!(
            "\n## Monitoring\nParameters: {}\nFrequency: {}\nWarning signals: {}\n",
            monitoring.parameters, monitoring.frequency, monitoring.warning_signals
        ));
    }

    if !finding.contraindications.is_empty() {
        out.push_str("\n## Contraindications\n");
        for item in &finding.contraindications {
            out.push_str(&format!("- {}\n", item));
        }
    }

    if !finding.relevant_metrics.is_empty() {
        out.push_str("\n## Relevant metrics\n");
        for metric in &finding.relevant_metrics {
            out.push_str(&format!(
                "- {}: {} ({:?}) - {}\n",
                metric.metric, metric.value, metric.status, metric.interpretation
            ));
        }
    }

    out
}
