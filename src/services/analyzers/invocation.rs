//! Analyzer Invocation
//!
//! Turns one descriptor and the shared context into exactly one `Finding`.
//! Any failure of the model call becomes the deterministic placeholder for
//! the specialty; this function never fails.

use std::time::Duration;

use tracing::{debug, warn};

use medpanel_core::{ClinicalContext, Finding, UnavailableReason};
use medpanel_llm::{LlmError, StructuredInvoker, StructuredRequest};
use medpanel_quality_gates::RevisionRequest;

use super::pool::AnalyzerDescriptor;

/// Usage stage tag for analyzer calls.
pub const ANALYZER_STAGE: &str = "analyzer";

/// Placeholder reason for a failed model call.
pub fn unavailable_reason(error: &LlmError) -> UnavailableReason {
    match error {
        LlmError::Timeout { .. } => UnavailableReason::Timeout,
        LlmError::ParseError { .. } | LlmError::ContractViolation { .. } => {
            UnavailableReason::ContractViolation
        }
        LlmError::EmptyResponse { .. } => UnavailableReason::EmptyResponse,
        _ => UnavailableReason::Transport,
    }
}

/// User prompt for one analyzer request.
pub fn build_prompt(
    descriptor: &AnalyzerDescriptor,
    context: &ClinicalContext,
    revision: Option<&RevisionRequest>,
) -> String {
    let mut prompt = format!(
        "Analyze the following patient data as the panel's {}.\n\n{}\n",
        descriptor.specialty.display_name(),
        context.to_prompt_block()
    );
    if let Some(revision) = revision {
        prompt.push('\n');
        prompt.push_str(&revision.to_prompt_section());
    }
    prompt
}

/// Run one analyzer attempt.
pub async fn invoke(
    invoker: &StructuredInvoker,
    descriptor: &AnalyzerDescriptor,
    context: &ClinicalContext,
    revision: Option<&RevisionRequest>,
    timeout: Duration,
) -> Finding {
    let specialty = descriptor.specialty;
    let request = StructuredRequest::new(
        ANALYZER_STAGE,
        descriptor.system_prompt(),
        build_prompt(descriptor, context, revision),
        timeout,
    )
    .with_subject(specialty.key());

    match invoker.call::<Finding>(request).await {
        Ok(mut finding) => {
            debug!(specialty = specialty.key(), "Analyzer produced a finding");
            // Origin is never taken from model output
            finding.origin = Default::default();
            finding
        }
        Err(e) => {
            let reason = unavailable_reason(&e);
            warn!(
                specialty = specialty.key(),
                reason = %reason,
                "Analyzer failed, using placeholder: {}",
                e
            );
            Finding::unavailable(specialty.display_name(), reason)
        }
    }
}
