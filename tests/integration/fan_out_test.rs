//! Fan-out Integration Tests
//!
//! One slot per dispatched analyzer, in dispatch order, whatever happens to
//! the individual analyzer calls.

use std::time::Duration;

use medpanel::{
    CancellationToken, ClinicalContext, PanelConfigBuilder, PanelSelection, Specialty,
};
use medpanel_core::UnavailableReason;
use medpanel_llm::LlmError;
use medpanel_quality_gates::TerminalState;

use crate::support::{engine, happy_path, Reply, ScriptedProvider};

// ============================================================================
// Helper Functions
// ============================================================================

fn anemia_context() -> ClinicalContext {
    ClinicalContext::new(
        "Hemoglobin 9.8 g/dL (ref 12-16). Ferritin 8 ng/mL. MCV 72 fL.",
        "34-year-old woman, fatigue for 3 months, heavy menstrual bleeding.",
    )
}

fn quiet_config() -> PanelConfigBuilder {
    PanelConfigBuilder::new().urgency_triage(false)
}

// ============================================================================
// Cardinality and ordering
// ============================================================================

#[tokio::test]
async fn test_full_pool_yields_one_report_per_analyzer_in_pool_order() {
    let provider = ScriptedProvider::new(happy_path);
    let engine = engine(provider.clone(), quiet_config().build().unwrap());

    let result = engine
        .diagnose(anemia_context(), PanelSelection::All, &CancellationToken::new())
        .await
        .unwrap();

    let findings = &result.specialist_findings;
    assert_eq!(findings.len(), Specialty::ALL.len());
    let order: Vec<Specialty> = findings.iter().map(|r| r.specialty).collect();
    assert_eq!(order, Specialty::ALL.to_vec());
    assert_eq!(findings.count_terminal(TerminalState::Approved), 26);

    assert_eq!(provider.count("analyzer"), 26);
    assert_eq!(provider.count("validator"), 26);
    assert_eq!(provider.count("synthesis"), 1);
    assert_eq!(provider.count("urgency"), 0);
    assert_eq!(result.diagnosis, "Iron deficiency anemia");
}

#[tokio::test]
async fn test_explicit_selection_keeps_requested_order() {
    let provider = ScriptedProvider::new(happy_path);
    let engine = engine(provider, quiet_config().build().unwrap());

    let requested = vec![Specialty::Nutrition, Specialty::Gynecology, Specialty::Hematology];
    let result = engine
        .diagnose(
            anemia_context(),
            PanelSelection::Specialties(requested.clone()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let order: Vec<Specialty> = result.specialist_findings.iter().map(|r| r.specialty).collect();
    assert_eq!(order, requested);
    assert_eq!(result.specialist_findings.reports()[1].specialist, "Gynecologist");
}

#[tokio::test(start_paused = true)]
async fn test_slot_order_ignores_completion_order() {
    let requested = vec![
        Specialty::Cardiology,
        Specialty::Hematology,
        Specialty::Nutrition,
        Specialty::Endocrinology,
    ];
    // First dispatched finishes last
    let delays = requested.clone();
    let provider = ScriptedProvider::new(move |call| {
        if call.stage == "analyzer" {
            let slot = delays.iter().position(|s| Some(*s) == call.specialty).unwrap_or(0);
            let secs = 10 * (delays.len() - slot) as u64;
            return happy_path(call).after(Duration::from_secs(secs));
        }
        happy_path(call)
    });
    let config = quiet_config().analyzer_call_secs(60).build().unwrap();
    let engine = engine(provider.clone(), config);

    let result = engine
        .diagnose(
            anemia_context(),
            PanelSelection::Specialties(requested.clone()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let reviewed: Vec<Option<Specialty>> = provider
        .calls_for("validator", None)
        .iter()
        .map(|c| c.specialty)
        .collect();
    let reversed: Vec<Option<Specialty>> = requested.iter().rev().copied().map(Some).collect();
    assert_eq!(reviewed, reversed);

    let findings = &result.specialist_findings;
    assert_eq!(findings.len(), requested.len());
    for (report, specialty) in findings.iter().zip(&requested) {
        assert_eq!(report.specialty, *specialty);
        assert_eq!(report.specialist, specialty.display_name());
        assert_eq!(
            report.finding.findings,
            format!("{} review: values reviewed", specialty.display_name())
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_mixed_failures_still_fill_every_slot() {
    let provider = ScriptedProvider::new(|call| {
        if call.stage == "analyzer" {
            match call.specialty {
                Some(Specialty::Hematology) => {
                    return happy_path(call).after(Duration::from_secs(30))
                }
                Some(Specialty::Nephrology) => return Reply::text("Unable to comply."),
                Some(Specialty::Nutrition) => {
                    return Reply::error(LlmError::NetworkError {
                        message: "connection refused".into(),
                    })
                }
                _ => {}
            }
        }
        happy_path(call)
    });
    let config = quiet_config().analyzer_call_secs(5).build().unwrap();
    let engine = engine(provider, config);

    let requested = vec![
        Specialty::Cardiology,
        Specialty::Hematology,
        Specialty::Nephrology,
        Specialty::Nutrition,
    ];
    let result = engine
        .diagnose(
            anemia_context(),
            PanelSelection::Specialties(requested.clone()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let findings = &result.specialist_findings;
    assert_eq!(findings.len(), 4);
    let order: Vec<Specialty> = findings.iter().map(|r| r.specialty).collect();
    assert_eq!(order, requested);

    let reasons: Vec<Option<UnavailableReason>> = findings
        .iter()
        .map(|r| r.finding.unavailable_reason())
        .collect();
    assert_eq!(
        reasons,
        vec![
            None,
            Some(UnavailableReason::Timeout),
            Some(UnavailableReason::ContractViolation),
            Some(UnavailableReason::Transport),
        ]
    );
    assert_eq!(findings.count_terminal(TerminalState::Approved), 1);
    assert_eq!(findings.count_terminal(TerminalState::Unavailable), 3);
}

// ============================================================================
// Isolation
// ============================================================================

#[tokio::test]
async fn test_failing_analyzer_does_not_affect_siblings() {
    let provider = ScriptedProvider::new(|call| {
        if call.stage == "analyzer" && call.specialty == Some(Specialty::Nephrology) {
            return Reply::error(LlmError::NetworkError {
                message: "connection reset".into(),
            });
        }
        happy_path(call)
    });
    let engine = engine(provider.clone(), quiet_config().build().unwrap());

    let result = engine
        .diagnose(
            anemia_context(),
            PanelSelection::Specialties(vec![
                Specialty::Cardiology,
                Specialty::Nephrology,
                Specialty::Hematology,
            ]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let findings = &result.specialist_findings;
    assert_eq!(findings.len(), 3);
    assert_eq!(findings.available_count(), 2);

    let nephrology = findings.get(Specialty::Nephrology).unwrap();
    assert!(nephrology.is_unavailable());
    assert_eq!(
        nephrology.finding.unavailable_reason(),
        Some(UnavailableReason::Transport)
    );
    assert_eq!(nephrology.resolution.terminal, TerminalState::Unavailable);

    // Placeholders are never sent to the critic
    assert!(provider
        .calls_for("validator", Some(Specialty::Nephrology))
        .is_empty());

    let synthesis = provider.calls_for("synthesis", None);
    assert_eq!(synthesis.len(), 1);
    assert!(synthesis[0].prompt.contains("Nephrologist [UNAVAILABLE"));
    assert!(synthesis[0].prompt.contains("## Cardiologist"));
}

#[tokio::test]
async fn test_sibling_reports_match_an_all_healthy_run() {
    let panel = vec![Specialty::Cardiology, Specialty::Nephrology, Specialty::Hematology];

    let healthy = engine(
        ScriptedProvider::new(happy_path),
        quiet_config().build().unwrap(),
    );
    let baseline = healthy
        .diagnose(
            anemia_context(),
            PanelSelection::Specialties(panel.clone()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let degraded = engine(
        ScriptedProvider::new(|call| {
            if call.stage == "analyzer" && call.specialty == Some(Specialty::Nephrology) {
                return Reply::error(LlmError::ServerError {
                    message: "internal error".into(),
                    status: Some(500),
                });
            }
            happy_path(call)
        }),
        quiet_config().build().unwrap(),
    );
    let result = degraded
        .diagnose(
            anemia_context(),
            PanelSelection::Specialties(panel),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!baseline.specialist_findings.get(Specialty::Nephrology).unwrap().is_unavailable());
    assert!(result.specialist_findings.get(Specialty::Nephrology).unwrap().is_unavailable());
    for specialty in [Specialty::Cardiology, Specialty::Hematology] {
        assert_eq!(
            result.specialist_findings.get(specialty),
            baseline.specialist_findings.get(specialty)
        );
    }
}

// ============================================================================
// Timeouts
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_slow_analyzer_times_out_while_others_complete() {
    let provider = ScriptedProvider::new(|call| {
        if call.stage == "analyzer" && call.specialty == Some(Specialty::Hematology) {
            return happy_path(call).after(Duration::from_secs(30));
        }
        happy_path(call)
    });
    let config = quiet_config().analyzer_call_secs(5).build().unwrap();
    let engine = engine(provider.clone(), config);

    let started = tokio::time::Instant::now();
    let result = engine
        .diagnose(
            anemia_context(),
            PanelSelection::Specialties(vec![
                Specialty::Cardiology,
                Specialty::Hematology,
                Specialty::Nutrition,
            ]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(30));

    let findings = &result.specialist_findings;
    let hematology = findings.get(Specialty::Hematology).unwrap();
    assert_eq!(
        hematology.finding.unavailable_reason(),
        Some(UnavailableReason::Timeout)
    );
    assert_eq!(hematology.resolution.terminal, TerminalState::Unavailable);
    assert_eq!(hematology.resolution.attempts, 1);

    for specialty in [Specialty::Cardiology, Specialty::Nutrition] {
        let report = findings.get(specialty).unwrap();
        assert!(!report.is_unavailable());
        assert_eq!(report.resolution.terminal, TerminalState::Approved);
    }
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_deadline_cancels_outstanding_slots() {
    let provider = ScriptedProvider::new(|call| {
        if call.stage == "analyzer" && call.specialty == Some(Specialty::Oncology) {
            return happy_path(call).after(Duration::from_secs(100));
        }
        happy_path(call)
    });
    let config = quiet_config()
        .analyzer_call_secs(300)
        .fan_out_deadline_secs(20)
        .build()
        .unwrap();
    let engine = engine(provider, config);

    let result = engine
        .diagnose(
            anemia_context(),
            PanelSelection::Specialties(vec![Specialty::Hematology, Specialty::Oncology]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let oncology = result.specialist_findings.get(Specialty::Oncology).unwrap();
    assert_eq!(
        oncology.finding.unavailable_reason(),
        Some(UnavailableReason::Cancelled)
    );
    let hematology = result.specialist_findings.get(Specialty::Hematology).unwrap();
    assert_eq!(hematology.resolution.terminal, TerminalState::Approved);
}

#[tokio::test]
async fn test_all_analyzers_failing_still_synthesizes() {
    let provider = ScriptedProvider::new(|call| {
        if call.stage == "analyzer" {
            return Reply::text("I cannot help with that.");
        }
        happy_path(call)
    });
    let engine = engine(provider.clone(), quiet_config().build().unwrap());

    let result = engine
        .diagnose(
            anemia_context(),
            PanelSelection::Specialties(vec![Specialty::Cardiology, Specialty::Hematology]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.specialist_findings.available_count(), 0);
    for report in &result.specialist_findings {
        assert_eq!(
            report.finding.unavailable_reason(),
            Some(UnavailableReason::ContractViolation)
        );
    }
    assert_eq!(provider.count("synthesis"), 1);
}
