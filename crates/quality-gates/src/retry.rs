//! Retry-With-Feedback Controller
//!
//! Per-slot state machine:
//!
//! ```text
//! Dispatched -> Validating -> Approved
//!     ^              |
//!     +-- Rejected --+ (attempts remaining)
//! ```
//!
//! Terminal states: `Approved`, `FailOpen` (validator error), `Exhausted`
//! (rejected on the last permitted attempt, last finding kept) and
//! `Unavailable` (the analyzer produced a placeholder; placeholders are
//! never reviewed or re-dispatched).
//!
//! The loop is bounded by `1 + max_retries` analyzer invocations.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use medpanel_core::{ClinicalContext, Finding};

use crate::models::{
    SlotResolution, TerminalState, ValidationIssue, ValidationVerdict,
};
use crate::validator::FindingValidator;

/// Reviewer feedback threaded into a regenerated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRequest {
    /// 1-based number of the attempt this revision is for (2 for the first retry)
    pub attempt: u32,
    pub previous_score: u8,
    pub feedback: String,
    pub issues: Vec<ValidationIssue>,
}

impl RevisionRequest {
    fn from_verdict(attempt: u32, verdict: &ValidationVerdict) -> Self {
        Self {
            attempt,
            previous_score: verdict.score,
            feedback: verdict.feedback.clone(),
            issues: verdict.issues.clone(),
        }
    }

    /// Prompt section appended to the analyzer request.
    pub fn to_prompt_section(&self) -> String {
        let mut out = format!(
            "## Reviewer feedback on your previous analysis (score {}/100)\n",
            self.previous_score
        );
        if !self.feedback.trim().is_empty() {
            out.push_str(self.feedback.trim());
            out.push('\n');
        }
        for issue in &self.issues {
            out.push_str(&format!(
                "- [{}] {}: {} Fix: {}\n",
                issue.severity, issue.category, issue.description, issue.suggestion
            ));
        }
        out.push_str("Produce a complete, corrected analysis that addresses every point above.\n");
        out
    }
}

/// Result of one slot's retry loop.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub finding: Finding,
    pub resolution: SlotResolution,
    pub last_verdict: Option<ValidationVerdict>,
}

enum SlotState {
    Dispatched {
        attempt: u32,
        revision: Option<RevisionRequest>,
    },
    Validating {
        attempt: u32,
        finding: Finding,
    },
    Done(RetryOutcome),
}

/// Bounded retry loop driver.
#[derive(Debug, Clone, Copy)]
pub struct RetryController {
    max_retries: u32,
    inject_feedback: bool,
}

impl Default for RetryController {
    fn default() -> Self {
        Self {
            max_retries: 2,
            inject_feedback: true,
        }
    }
}

impl RetryController {
    pub fn new(max_retries: u32, inject_feedback: bool) -> Self {
        Self {
            max_retries,
            inject_feedback,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Drive one slot to a terminal state.
    ///
    /// `invoke` is called once per attempt with the revision to apply (always
    /// `None` on the first attempt, and on retries when feedback injection is
    /// off). It must not fail; failures are placeholder findings.
    pub async fn run<F, Fut>(
        &self,
        specialist: &str,
        context: &ClinicalContext,
        validator: &dyn FindingValidator,
        mut invoke: F,
    ) -> RetryOutcome
    where
        F: FnMut(Option<RevisionRequest>) -> Fut,
        Fut: Future<Output = Finding>,
    {
        let max_attempts = self.max_attempts();
        // Last reviewed model finding and its verdict; kept when a retry
        // degrades to a placeholder.
        let mut best: Option<(Finding, ValidationVerdict)> = None;
        let mut state = SlotState::Dispatched {
            attempt: 1,
            revision: None,
        };

        loop {
            state = match state {
                SlotState::Dispatched { attempt, revision } => {
                    debug!(specialty = specialist, attempt, "Dispatching analyzer");
                    let finding = invoke(revision).await;
                    if !finding.is_unavailable() {
                        SlotState::Validating { attempt, finding }
                    } else if let Some((previous, verdict)) = best.take() {
                        info!(
                            specialty = specialist,
                            attempt,
                            "Regeneration failed, keeping previous finding"
                        );
                        SlotState::Done(RetryOutcome {
                            finding: previous,
                            resolution: SlotResolution {
                                terminal: TerminalState::Exhausted,
                                attempts: attempt,
                                last_score: Some(verdict.score),
                            },
                            last_verdict: Some(verdict),
                        })
                    } else {
                        SlotState::Done(RetryOutcome {
                            finding,
                            resolution: SlotResolution::unavailable(attempt),
                            last_verdict: None,
                        })
                    }
                }
                SlotState::Validating { attempt, finding } => {
                    let verdict = validator.validate(specialist, context, &finding).await;
                    if verdict.fail_open {
                        SlotState::Done(RetryOutcome {
                            finding,
                            resolution: SlotResolution {
                                terminal: TerminalState::FailOpen,
                                attempts: attempt,
                                last_score: None,
                            },
                            last_verdict: Some(verdict),
                        })
                    } else if verdict.approved {
                        info!(specialty = specialist, attempt, score = verdict.score, "Finding approved");
                        SlotState::Done(RetryOutcome {
                            finding,
                            resolution: SlotResolution {
                                terminal: TerminalState::Approved,
                                attempts: attempt,
                                last_score: Some(verdict.score),
                            },
                            last_verdict: Some(verdict),
                        })
                    } else if attempt >= max_attempts {
                        info!(
                            specialty = specialist,
                            attempt,
                            score = verdict.score,
                            "Retries exhausted, keeping last finding"
                        );
                        SlotState::Done(RetryOutcome {
                            finding,
                            resolution: SlotResolution {
                                terminal: TerminalState::Exhausted,
                                attempts: attempt,
                                last_score: Some(verdict.score),
                            },
                            last_verdict: Some(verdict),
                        })
                    } else {
                        info!(
                            specialty = specialist,
                            attempt,
                            score = verdict.score,
                            issues = verdict.issues.len(),
                            "Finding rejected, requesting revision"
                        );
                        let revision = self
                            .inject_feedback
                            .then(|| RevisionRequest::from_verdict(attempt + 1, &verdict));
                        best = Some((finding, verdict));
                        SlotState::Dispatched {
                            attempt: attempt + 1,
                            revision,
                        }
                    }
                }
                SlotState::Done(outcome) => return outcome,
            };
        }
    }
}
