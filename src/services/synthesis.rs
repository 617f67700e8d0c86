//! Synthesizer
//!
//! Final model call merging every specialist's report into one diagnosis
//! and action plan. Unlike the analyzer and validator stages there is no
//! fallback here: without a synthesis there is no report.

use std::time::Duration;

use tracing::{error, info};

use medpanel_core::ClinicalContext;
use medpanel_llm::{StructuredInvoker, StructuredRequest};

use crate::models::{FindingSet, SynthesisOutput};
use crate::utils::error::{EngineError, EngineResult};

/// Usage stage tag for synthesis calls.
pub const SYNTHESIS_STAGE: &str = "synthesis";

const SYNTHESIS_SYSTEM_PROMPT: &str = "\
You are the coordinating physician of a multidisciplinary diagnostic panel. \
Review the patient data and the reports of the consulted specialists, then \
produce one unified, coherent diagnosis.

- Integrate the findings of all specialists; resolve or explicitly note \
disagreements between them.
- Prioritize the most clinically significant findings.
- Reports marked UNAVAILABLE could not be produced; do not infer anything \
from them, and list the affected specialties as requiring manual review.
- In the suggestions, give a prioritized action plan: next steps, further \
tests, referrals and follow-up timelines.
- Base everything ONLY on the data and reports provided.";

/// Merges a resolved finding set into the final diagnosis.
#[derive(Clone)]
pub struct Synthesizer {
    invoker: StructuredInvoker,
    timeout: Duration,
}

impl Synthesizer {
    pub fn new(invoker: StructuredInvoker, timeout: Duration) -> Self {
        Self { invoker, timeout }
    }

    pub async fn synthesize(
        &self,
        context: &ClinicalContext,
        findings: &FindingSet,
    ) -> EngineResult<SynthesisOutput> {
        let request = StructuredRequest::new(
            SYNTHESIS_STAGE,
            SYNTHESIS_SYSTEM_PROMPT,
            build_prompt(context, findings),
            self.timeout,
        );

        match self.invoker.call::<SynthesisOutput>(request).await {
            Ok(output) => {
                info!(
                    specialists = findings.len(),
                    available = findings.available_count(),
                    "Synthesis complete"
                );
                Ok(output)
            }
            Err(e) => {
                error!("Synthesis failed: {}", e);
                Err(EngineError::Synthesis(e))
            }
        }
    }
}

/// Synthesis prompt: the context, then each specialist's three required
/// fields. Extended blocks stay out of the prompt.
pub fn build_prompt(context: &ClinicalContext, findings: &FindingSet) -> String {
    let mut prompt = format!("{}\n\n# Specialist reports\n", context.to_prompt_block());
    for report in findings {
        let finding = &report.finding;
        match finding.unavailable_reason() {
            Some(reason) => prompt.push_str(&format!(
                "\n## {} [UNAVAILABLE: {} - manual review required]\n",
                report.specialist, reason
            )),
            None => prompt.push_str(&format!(
                "\n## {}\n### Findings\n{}\n### Clinical assessment\n{}\n### Recommendations\n{}\n",
                report.specialist,
                finding.findings.trim(),
                finding.clinical_assessment.trim(),
                finding.recommendations.trim()
            )),
        }
    }
    prompt
}
