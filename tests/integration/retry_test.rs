//! Retry Integration Tests
//!
//! Critic review of each finding and the bounded regeneration loop, driven
//! through the full engine.

use medpanel::{
    CancellationToken, ClinicalContext, PanelConfigBuilder, PanelSelection, Specialty,
};
use medpanel_llm::LlmError;
use medpanel_quality_gates::TerminalState;

use crate::support::{critic_json, engine, finding_json, happy_path, Reply, ScriptedProvider};

fn lipid_context() -> ClinicalContext {
    ClinicalContext::new(
        "LDL 190 mg/dL. HDL 38 mg/dL. Triglycerides 260 mg/dL. BP 150/95 mmHg.",
        "52-year-old man, smoker, father had a myocardial infarction at 55.",
    )
}

fn cardiology_only() -> PanelSelection {
    PanelSelection::Specialties(vec![Specialty::Cardiology])
}

/// Analyzer replies that carry the attempt index in their findings text.
fn numbered_analyzer(call: &crate::support::Call) -> Option<Reply> {
    (call.stage == "analyzer").then(|| {
        Reply::text(finding_json(
            Specialty::Cardiology,
            &format!("attempt {}", call.nth + 1),
        ))
    })
}

// ============================================================================
// Approval after revisions
// ============================================================================

#[tokio::test]
async fn test_rejected_twice_then_approved() {
    let provider = ScriptedProvider::new(|call| {
        if let Some(reply) = numbered_analyzer(call) {
            return reply;
        }
        if call.stage == "validator" {
            return Reply::text(match call.nth {
                0 => critic_json(60, "Cite the measured LDL value."),
                1 => critic_json(65, "Give a statin dose and a timeline."),
                _ => critic_json(85, ""),
            });
        }
        happy_path(call)
    });
    let config = PanelConfigBuilder::new().urgency_triage(false).build().unwrap();
    let engine = engine(provider.clone(), config);

    let result = engine
        .diagnose(lipid_context(), cardiology_only(), &CancellationToken::new())
        .await
        .unwrap();

    let report = result.specialist_findings.get(Specialty::Cardiology).unwrap();
    assert_eq!(report.resolution.terminal, TerminalState::Approved);
    assert_eq!(report.resolution.attempts, 3);
    assert_eq!(report.resolution.last_score, Some(85));
    assert!(report.finding.findings.contains("attempt 3"));

    let analyzer_calls = provider.calls_for("analyzer", Some(Specialty::Cardiology));
    assert_eq!(analyzer_calls.len(), 3);
    assert!(!analyzer_calls[0].prompt.contains("Reviewer feedback"));
    assert!(analyzer_calls[1]
        .prompt
        .contains("Reviewer feedback on your previous analysis (score 60/100)"));
    assert!(analyzer_calls[1].prompt.contains("Cite the measured LDL value."));
    assert!(analyzer_calls[2].prompt.contains("(score 65/100)"));
    assert!(analyzer_calls[2].prompt.contains("Give a statin dose and a timeline."));
}

// ============================================================================
// Exhaustion
// ============================================================================

#[tokio::test]
async fn test_retry_bound_keeps_last_finding() {
    let provider = ScriptedProvider::new(|call| {
        if let Some(reply) = numbered_analyzer(call) {
            return reply;
        }
        if call.stage == "validator" {
            return Reply::text(critic_json(40, "Analysis is generic."));
        }
        happy_path(call)
    });
    let config = PanelConfigBuilder::new()
        .max_retries(2)
        .urgency_triage(false)
        .build()
        .unwrap();
    let engine = engine(provider.clone(), config);

    let result = engine
        .diagnose(lipid_context(), cardiology_only(), &CancellationToken::new())
        .await
        .unwrap();

    let report = result.specialist_findings.get(Specialty::Cardiology).unwrap();
    assert_eq!(report.resolution.terminal, TerminalState::Exhausted);
    assert_eq!(report.resolution.attempts, 3);
    assert_eq!(report.resolution.last_score, Some(40));
    assert!(!report.is_unavailable());
    assert!(report.finding.findings.contains("attempt 3"));

    assert_eq!(provider.calls_for("analyzer", Some(Specialty::Cardiology)).len(), 3);
    assert_eq!(provider.calls_for("validator", Some(Specialty::Cardiology)).len(), 3);
}

#[tokio::test]
async fn test_zero_retries_accepts_first_rejected_finding() {
    let provider = ScriptedProvider::new(|call| {
        if call.stage == "validator" {
            return Reply::text(critic_json(20, "Missing most values."));
        }
        happy_path(call)
    });
    let config = PanelConfigBuilder::new()
        .max_retries(0)
        .urgency_triage(false)
        .build()
        .unwrap();
    let engine = engine(provider.clone(), config);

    let result = engine
        .diagnose(lipid_context(), cardiology_only(), &CancellationToken::new())
        .await
        .unwrap();

    let report = result.specialist_findings.get(Specialty::Cardiology).unwrap();
    assert_eq!(report.resolution.terminal, TerminalState::Exhausted);
    assert_eq!(report.resolution.attempts, 1);
    assert_eq!(provider.count("analyzer"), 1);
}

#[tokio::test]
async fn test_failed_regeneration_keeps_previous_finding() {
    let provider = ScriptedProvider::new(|call| {
        if call.stage == "analyzer" && call.nth > 0 {
            return Reply::error(LlmError::RateLimited {
                message: "quota".into(),
                retry_after: Some(30),
            });
        }
        if let Some(reply) = numbered_analyzer(call) {
            return reply;
        }
        if call.stage == "validator" {
            return Reply::text(critic_json(50, "Add the blood pressure reading."));
        }
        happy_path(call)
    });
    let config = PanelConfigBuilder::new().urgency_triage(false).build().unwrap();
    let engine = engine(provider.clone(), config);

    let result = engine
        .diagnose(lipid_context(), cardiology_only(), &CancellationToken::new())
        .await
        .unwrap();

    let report = result.specialist_findings.get(Specialty::Cardiology).unwrap();
    assert_eq!(report.resolution.terminal, TerminalState::Exhausted);
    assert_eq!(report.resolution.attempts, 2);
    assert!(!report.is_unavailable());
    assert!(report.finding.findings.contains("attempt 1"));
    assert_eq!(provider.count("validator"), 1);
}

// ============================================================================
// Fail-open and feedback injection
// ============================================================================

#[tokio::test]
async fn test_validator_failure_fails_open() {
    let provider = ScriptedProvider::new(|call| {
        if call.stage == "validator" {
            return Reply::error(LlmError::ServerError {
                message: "overloaded".into(),
                status: Some(503),
            });
        }
        happy_path(call)
    });
    let config = PanelConfigBuilder::new().urgency_triage(false).build().unwrap();
    let engine = engine(provider.clone(), config);

    let result = engine
        .diagnose(lipid_context(), cardiology_only(), &CancellationToken::new())
        .await
        .unwrap();

    let report = result.specialist_findings.get(Specialty::Cardiology).unwrap();
    assert_eq!(report.resolution.terminal, TerminalState::FailOpen);
    assert_eq!(report.resolution.attempts, 1);
    assert_eq!(report.resolution.last_score, None);
    assert!(!report.is_unavailable());
    assert_eq!(provider.count("analyzer"), 1);
}

#[tokio::test]
async fn test_feedback_injection_disabled_regenerates_plain_prompt() {
    let provider = ScriptedProvider::new(|call| {
        if call.stage == "validator" {
            return Reply::text(if call.nth == 0 {
                critic_json(55, "Cite the triglyceride value.")
            } else {
                critic_json(80, "")
            });
        }
        happy_path(call)
    });
    let config = PanelConfigBuilder::new()
        .inject_feedback(false)
        .urgency_triage(false)
        .build()
        .unwrap();
    let engine = engine(provider.clone(), config);

    let result = engine
        .diagnose(lipid_context(), cardiology_only(), &CancellationToken::new())
        .await
        .unwrap();

    let report = result.specialist_findings.get(Specialty::Cardiology).unwrap();
    assert_eq!(report.resolution.terminal, TerminalState::Approved);
    assert_eq!(report.resolution.attempts, 2);

    let analyzer_calls = provider.calls_for("analyzer", Some(Specialty::Cardiology));
    assert_eq!(analyzer_calls.len(), 2);
    assert_eq!(analyzer_calls[0].prompt, analyzer_calls[1].prompt);
}

#[tokio::test]
async fn test_custom_threshold_approves_lower_scores() {
    let provider = ScriptedProvider::new(|call| {
        if call.stage == "validator" {
            return Reply::text(critic_json(62, "Acceptable."));
        }
        happy_path(call)
    });
    let config = PanelConfigBuilder::new()
        .approval_threshold(60)
        .urgency_triage(false)
        .build()
        .unwrap();
    let engine = engine(provider.clone(), config);

    let result = engine
        .diagnose(lipid_context(), cardiology_only(), &CancellationToken::new())
        .await
        .unwrap();

    let report = result.specialist_findings.get(Specialty::Cardiology).unwrap();
    assert_eq!(report.resolution.terminal, TerminalState::Approved);
    assert_eq!(report.resolution.last_score, Some(62));
    assert_eq!(provider.count("analyzer"), 1);
}
