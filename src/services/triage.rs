//! Triage
//!
//! Two optional model calls around the panel:
//!
//! - specialist triage picks the relevant subset of the pool before fan-out
//! - urgency triage classifies the synthesized diagnosis afterwards
//!
//! Neither is ever fatal. A failed specialist triage falls back to the
//! default panel; a failed urgency triage leaves the priority unset.

use std::collections::HashSet;
use std::time::Duration;

use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, info, warn};

use medpanel_core::ClinicalContext;
use medpanel_llm::{LlmResult, StructuredInvoker, StructuredOutput, StructuredRequest};

use crate::models::{SynthesisOutput, UrgencyLevel};
use crate::services::analyzers::{AnalyzerPool, Specialty};

pub const TRIAGE_STAGE: &str = "triage";
pub const URGENCY_STAGE: &str = "urgency";

// ============================================================================
// Specialist triage
// ============================================================================

const TRIAGE_SYSTEM_PROMPT: &str = "\
You are a General Practitioner AI coordinating a panel of specialists. Based \
on the patient's exam results and history, identify which of the listed \
specialists are most relevant to consult. Choose only specialists whose \
field is touched by the data; do not pick a specialist for a single \
borderline value with no clinical significance.";

/// What the triage model returns.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TriageOutput {
    /// Keys of the relevant specialists, taken from the provided list
    pub specialists: Vec<String>,
}

impl StructuredOutput for TriageOutput {}

/// Chooses which analyzers to dispatch.
#[derive(Clone)]
pub struct SpecialistTriage {
    invoker: StructuredInvoker,
    timeout: Duration,
}

impl SpecialistTriage {
    pub fn new(invoker: StructuredInvoker, timeout: Duration) -> Self {
        Self { invoker, timeout }
    }

    /// Ask the model for the relevant specialties. Unknown and duplicate
    /// keys are dropped; the result follows pool order.
    pub async fn triage(
        &self,
        context: &ClinicalContext,
        pool: &AnalyzerPool,
    ) -> LlmResult<Vec<Specialty>> {
        let request = StructuredRequest::new(
            TRIAGE_STAGE,
            TRIAGE_SYSTEM_PROMPT,
            build_triage_prompt(context, pool),
            self.timeout,
        );
        let output: TriageOutput = self.invoker.call(request).await?;
        Ok(filter_selection(&output.specialists, pool))
    }

    /// Triage, falling back to `default_panel` when the call fails or
    /// selects nothing.
    pub async fn select_or_default(
        &self,
        context: &ClinicalContext,
        pool: &AnalyzerPool,
        default_panel: &[Specialty],
    ) -> Vec<Specialty> {
        match self.triage(context, pool).await {
            Ok(selected) if !selected.is_empty() => {
                info!(
                    selected = selected.len(),
                    specialties = ?selected.iter().map(|s| s.key()).collect::<Vec<_>>(),
                    "Specialist triage complete"
                );
                selected
            }
            Ok(_) => {
                warn!("Specialist triage selected nothing, using default panel");
                default_panel.to_vec()
            }
            Err(e) => {
                warn!("Specialist triage failed, using default panel: {}", e);
                default_panel.to_vec()
            }
        }
    }
}

fn build_triage_prompt(context: &ClinicalContext, pool: &AnalyzerPool) -> String {
    let mut prompt = String::from("# Available specialists (key: title)\n");
    for d in pool.descriptors() {
        prompt.push_str(&format!("- {}: {}\n", d.specialty.key(), d.specialty.display_name()));
    }
    prompt.push('\n');
    prompt.push_str(&context.to_prompt_block());
    prompt
}

fn filter_selection(keys: &[String], pool: &AnalyzerPool) -> Vec<Specialty> {
    let mut wanted = HashSet::new();
    for key in keys {
        match key.parse::<Specialty>() {
            Ok(s) if pool.get(s).is_some() => {
                wanted.insert(s);
            }
            _ => debug!(key = %key, "Ignoring unknown specialist from triage"),
        }
    }
    pool.specialties()
        .into_iter()
        .filter(|s| wanted.contains(s))
        .collect()
}

// ============================================================================
// Urgency triage
// ============================================================================

const URGENCY_SYSTEM_PROMPT: &str = "\
You are a triage physician. Classify the clinical priority of the case from \
its diagnosis and action plan:

- urgent: immediately life-threatening, e.g. suspected heart attack, stroke, \
sepsis or critical lab values
- high: serious but not immediately life-threatening, e.g. a new cancer \
diagnosis or uncontrolled diabetes
- normal: routine findings or stable chronic conditions

Give a one-sentence justification.";

/// What the urgency model returns.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UrgencyOutput {
    pub priority: UrgencyLevel,
    #[serde(default)]
    pub justification: String,
}

impl StructuredOutput for UrgencyOutput {}

/// Classifies the synthesized diagnosis.
#[derive(Clone)]
pub struct UrgencyTriage {
    invoker: StructuredInvoker,
    timeout: Duration,
}

impl UrgencyTriage {
    pub fn new(invoker: StructuredInvoker, timeout: Duration) -> Self {
        Self { invoker, timeout }
    }

    /// Priority of the case, or `None` when classification fails.
    pub async fn classify(&self, synthesis: &SynthesisOutput) -> Option<UrgencyLevel> {
        let prompt = format!(
            "# Diagnosis\n{}\n\n# Action plan\n{}",
            synthesis.diagnosis.trim(),
            synthesis.suggestions.trim()
        );
        let request = StructuredRequest::new(URGENCY_STAGE, URGENCY_SYSTEM_PROMPT, prompt, self.timeout);
        match self.invoker.call::<UrgencyOutput>(request).await {
            Ok(output) => {
                info!(priority = %output.priority, "Urgency triage complete");
                debug!(justification = %output.justification, "Urgency justification");
                Some(output.priority)
            }
            Err(e) => {
                warn!("Urgency triage failed, leaving priority unset: {}", e);
                None
            }
        }
    }
}
